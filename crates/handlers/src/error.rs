//! Handler-level error type.

use thiserror::Error;

/// Errors returned by a handler's `run` method.
///
/// Either variant ends the task as failed; the engine never retries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskExecutionError {
    /// The task input document could not be used.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The handler failed while processing valid input.
    #[error("{0}")]
    Failed(String),
}
