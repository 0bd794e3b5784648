//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use db::WorkflowStatus;

/// A workflow definition was rejected before anything was persisted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("workflow '{0}' has no steps")]
    NoSteps(String),

    #[error("step #{index} has an empty task type")]
    EmptyTaskType { index: usize },

    /// Two steps share the same name.
    #[error("duplicate step name: '{0}'")]
    DuplicateStepName(String),

    /// A `dependsOn` names a step that doesn't exist in the workflow.
    #[error("step '{step}' depends on unknown step '{depends_on}'")]
    UnknownDependency { step: String, depends_on: String },

    /// Topological sort left steps unvisited.
    #[error("dependency cycle between steps: {}", steps.join(", "))]
    CycleDetected { steps: Vec<String> },

    #[error("malformed workflow definition: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Errors produced by the workflow engine (creation, execution, queries).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workflow definition: {0}")]
    Validation(#[from] ValidationError),

    /// No handler is registered for a task type.
    #[error("no handler registered for task type '{task_type}' (step '{step}')")]
    Configuration { task_type: String, step: String },

    /// The store failed during a read or a transition.
    #[error("database error: {0}")]
    Persistence(#[from] db::DbError),

    #[error("workflow {0} not found")]
    NotFound(Uuid),

    #[error("workflow {workflow_id} is not yet completed (status: {status})")]
    NotCompleted {
        workflow_id: Uuid,
        status: WorkflowStatus,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Maps [`db::DbError::NotFound`] for a workflow lookup onto
    /// [`EngineError::NotFound`]; every other store error is a persistence
    /// failure.
    pub(crate) fn from_workflow_lookup(workflow_id: Uuid) -> impl FnOnce(db::DbError) -> Self {
        move |e| match e {
            db::DbError::NotFound => Self::NotFound(workflow_id),
            other => Self::Persistence(other),
        }
    }
}
