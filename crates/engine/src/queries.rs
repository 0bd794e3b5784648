//! Read-only views over a workflow's state.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use db::{Store, TaskStatus, WorkflowStatus};

use crate::EngineError;

/// Progress of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusView {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub completed_tasks: usize,
    pub total_tasks: usize,
}

/// Final outcome of a terminal workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResultsView {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub final_result: Option<Value>,
}

/// # Errors
/// [`EngineError::NotFound`] for unknown IDs.
pub async fn workflow_status(store: &dyn Store, workflow_id: Uuid) -> Result<WorkflowStatusView, EngineError> {
    let workflow = store
        .get_workflow(workflow_id)
        .await
        .map_err(EngineError::from_workflow_lookup(workflow_id))?;
    let tasks = store.list_tasks(workflow_id).await?;

    Ok(WorkflowStatusView {
        workflow_id,
        status: workflow.status,
        completed_tasks: tasks.iter().filter(|t| t.status == TaskStatus::Completed).count(),
        total_tasks: tasks.len(),
    })
}

/// # Errors
/// - [`EngineError::NotFound`] for unknown IDs.
/// - [`EngineError::NotCompleted`] while the workflow is `initial` or
///   `in_progress`.
pub async fn workflow_results(store: &dyn Store, workflow_id: Uuid) -> Result<WorkflowResultsView, EngineError> {
    let workflow = store
        .get_workflow(workflow_id)
        .await
        .map_err(EngineError::from_workflow_lookup(workflow_id))?;

    if !workflow.status.is_terminal() {
        return Err(EngineError::NotCompleted {
            workflow_id,
            status: workflow.status,
        });
    }

    Ok(WorkflowResultsView {
        workflow_id,
        status: workflow.status,
        final_result: workflow.final_result,
    })
}
