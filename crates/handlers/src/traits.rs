//! The `TaskHandler` trait: the contract every task type must fulfil.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::TaskExecutionError;

/// Read-only view of one task of the running workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub task_type: String,
    pub step_number: i32,
    /// Lower-case task status (`queued`, `in_progress`, `completed`, `failed`).
    pub status: String,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Shared context passed to every handler during execution.
///
/// Defined here (in the handlers crate) so both the engine and individual
/// handler implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the owning workflow.
    pub workflow_id: Uuid,
    /// ID of the task being run.
    pub task_id: Uuid,
    pub client_id: String,
    pub step_number: i32,
    /// Every task of the workflow (including this one), in step order.
    pub tasks: Vec<TaskSnapshot>,
}

/// The core handler trait.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task against its input document and return a serialisable
    /// output.
    async fn run(&self, input: &Value, ctx: &ExecutionContext) -> Result<Value, TaskExecutionError>;
}
