//! The `Store` trait: every durable read and write the engine performs.
//!
//! Status transitions are conditional writes: a store must refuse to move a
//! task out of a state it is no longer in, so two dispatchers racing on the
//! same row can never both own it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{ResultRow, TaskRow, WorkflowRow, WorkflowStatus};
use crate::DbError;

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a workflow together with all of its tasks, atomically.
    async fn insert_workflow(&self, workflow: &WorkflowRow, tasks: &[TaskRow]) -> Result<(), DbError>;

    /// Fetch a workflow by ID. Returns [`DbError::NotFound`] for unknown IDs.
    async fn get_workflow(&self, workflow_id: Uuid) -> Result<WorkflowRow, DbError>;

    /// Overwrite the aggregated status and report of a workflow.
    async fn update_workflow(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        final_result: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// All tasks of a workflow ordered by `step_number`, then `step_index`.
    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskRow>, DbError>;

    /// The first queued task whose dependency is absent or completed,
    /// ordered by `step_number`, then creation time, then `step_index`.
    async fn next_ready_task(&self) -> Result<Option<TaskRow>, DbError>;

    /// Compare-and-set `queued → in_progress`.
    ///
    /// Returns `false` when the task was no longer queued.
    async fn claim_task(&self, task_id: Uuid, progress: &str, now: DateTime<Utc>) -> Result<bool, DbError>;

    /// Compare-and-set `in_progress → queued`, dropping a claim whose run
    /// could not be recorded.
    ///
    /// Returns `false` when the task was no longer in progress.
    async fn release_task(&self, task_id: Uuid) -> Result<bool, DbError>;

    /// Move every `in_progress` task back to `queued` and return how many
    /// moved. Only sound while no dispatcher is running a task.
    async fn requeue_in_progress(&self) -> Result<u64, DbError>;

    /// Insert `result` and move the task `in_progress → completed`.
    async fn complete_task(&self, task_id: Uuid, result: &ResultRow, now: DateTime<Utc>) -> Result<(), DbError>;

    /// Move the task `in_progress → failed`, recording the cause.
    async fn fail_task(&self, task_id: Uuid, error: &str, now: DateTime<Utc>) -> Result<(), DbError>;

    /// Results produced by the tasks of a workflow.
    async fn list_results(&self, workflow_id: Uuid) -> Result<Vec<ResultRow>, DbError>;
}
