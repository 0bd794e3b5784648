//! `engine` crate: workflow definitions, dependency validation, and the
//! polling execution engine.
//!
//! Flow: [`WorkflowFactory`] materialises a definition into stored tasks,
//! the [`Dispatcher`] polls for ready tasks, the [`TaskRunner`] runs one task
//! to a terminal state, and the [`aggregator`] derives the workflow status
//! and final report from the task states.

pub mod aggregator;
pub mod dag;
pub mod error;
pub mod factory;
pub mod models;
pub mod queries;
pub mod runner;
pub mod time;
pub mod worker;

pub use error::{EngineError, ValidationError};
pub use factory::{MaterializedWorkflow, WorkflowFactory};
pub use models::{FinalReport, StepDefinition, TaskReport, WorkflowDefinition};
pub use runner::{TaskFailure, TaskOutcome, TaskRunner};
pub use time::{ManualClock, SystemClock, TimeSource};
pub use worker::{Dispatcher, DispatcherConfig, Tick};
