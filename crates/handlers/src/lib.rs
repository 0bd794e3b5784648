//! `handlers` crate: the `TaskHandler` trait, the handler registry, and the
//! built-in task types.
//!
//! Every task type must be backed by a [`TaskHandler`] registered in a
//! [`HandlerRegistry`]. The engine dispatches execution through this trait
//! object and never looks inside a handler.

pub mod error;
pub mod mock;
pub mod polygon_area;
pub mod registry;
pub mod report;
pub mod traits;

pub use error::TaskExecutionError;
pub use polygon_area::PolygonAreaHandler;
pub use registry::HandlerRegistry;
pub use report::ReportGenerationHandler;
pub use traits::{ExecutionContext, TaskHandler, TaskSnapshot};
