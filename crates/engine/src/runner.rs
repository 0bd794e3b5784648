//! Single-task execution.
//!
//! `TaskRunner::run` takes one ready task through its whole life-cycle:
//! 1. Snapshots the workflow's tasks and outputs for the handler.
//! 2. Claims the task (`queued → in_progress`, compare-and-set).
//! 3. Resolves the handler and runs it, recording the outcome (`completed`
//!    with a stored result, or `failed` with the cause). A failed write
//!    releases the claim.
//! 4. Recomputes the owning workflow's status and report.
//!
//! Handler failures and missing handlers end the task as failed and are
//! returned as a [`TaskOutcome`]; only store failures surface as errors.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::{ResultRow, Store, TaskRow, WorkflowStatus};
use handlers::{ExecutionContext, HandlerRegistry, TaskExecutionError, TaskSnapshot};

use crate::aggregator::aggregate;
use crate::time::TimeSource;
use crate::EngineError;

/// Progress note set when a task is claimed.
pub const STARTING_PROGRESS: &str = "starting job...";

/// Why a task ended up failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskFailure {
    #[error("no handler registered for task type '{task_type}'")]
    Configuration { task_type: String },

    #[error(transparent)]
    Execution(#[from] TaskExecutionError),
}

/// What happened to a task handed to the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { result_id: Uuid },
    Failed { failure: TaskFailure },
    /// The task was no longer queued when the runner tried to claim it.
    Skipped,
}

pub struct TaskRunner {
    store: Arc<dyn Store>,
    registry: HandlerRegistry,
    time: Arc<dyn TimeSource>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn Store>, registry: HandlerRegistry, time: Arc<dyn TimeSource>) -> Self {
        Self { store, registry, time }
    }

    /// Run `task` to a terminal state and refresh its workflow.
    ///
    /// Every read the handler needs happens before the claim. If a store
    /// write fails after the claim, the claim is released so the task is
    /// queued again for the next poll.
    ///
    /// # Errors
    /// Returns [`EngineError::Persistence`] if a store read or transition
    /// fails. When the failure is in the final aggregate refresh the task
    /// itself is already terminal; [`refresh_workflow`](Self::refresh_workflow)
    /// must be retried.
    #[instrument(
        skip(self, task),
        fields(
            task_id = %task.id,
            workflow_id = %task.workflow_id,
            task_type = %task.task_type,
            step = task.step_number,
        )
    )]
    pub async fn run(&self, task: &TaskRow) -> Result<TaskOutcome, EngineError> {
        let ctx = self.context_for(task).await?;

        if !self.store.claim_task(task.id, STARTING_PROGRESS, self.time.now()).await? {
            debug!("task is no longer queued; skipping");
            return Ok(TaskOutcome::Skipped);
        }
        info!("starting job");

        let outcome = match self.execute(task, &ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release(task).await;
                return Err(e);
            }
        };

        self.refresh_workflow(task.workflow_id).await?;
        Ok(outcome)
    }

    /// Invoke the handler on a claimed task and record the terminal state.
    async fn execute(&self, task: &TaskRow, ctx: &ExecutionContext) -> Result<TaskOutcome, EngineError> {
        let output = match self.registry.get(&task.task_type) {
            Some(handler) => handler.run(&task.input, ctx).await.map_err(TaskFailure::from),
            None => Err(TaskFailure::Configuration {
                task_type: task.task_type.clone(),
            }),
        };

        match output {
            Ok(data) => {
                let result = ResultRow {
                    id: Uuid::new_v4(),
                    task_id: task.id,
                    data,
                    created_at: self.time.now(),
                };
                self.store.complete_task(task.id, &result, self.time.now()).await?;
                info!(result_id = %result.id, "job completed");
                Ok(TaskOutcome::Completed { result_id: result.id })
            }
            Err(failure) => {
                error!(error = %failure, "job failed");
                self.store
                    .fail_task(task.id, &failure.to_string(), self.time.now())
                    .await?;
                Ok(TaskOutcome::Failed { failure })
            }
        }
    }

    /// Best-effort `in_progress → queued` after a failed write. If this
    /// fails too, the dispatcher's stale-task sweep picks the task up.
    async fn release(&self, task: &TaskRow) {
        match self.store.release_task(task.id).await {
            Ok(true) => warn!("outcome not recorded; task requeued"),
            Ok(false) => debug!("task already left in_progress; nothing to release"),
            Err(e) => error!(error = %e, "could not release claim"),
        }
    }

    async fn context_for(&self, task: &TaskRow) -> Result<ExecutionContext, EngineError> {
        let tasks = self.store.list_tasks(task.workflow_id).await?;
        let results = self.store.list_results(task.workflow_id).await?;
        let outputs: HashMap<Uuid, &Value> = results.iter().map(|r| (r.id, &r.data)).collect();

        let snapshots = tasks
            .iter()
            .map(|t| TaskSnapshot {
                task_id: t.id,
                task_type: t.task_type.clone(),
                step_number: t.step_number,
                status: t.status.to_string(),
                output: t.result_id.and_then(|id| outputs.get(&id)).map(|v| (*v).clone()),
                error: t.error.clone(),
            })
            .collect();

        Ok(ExecutionContext {
            workflow_id: task.workflow_id,
            task_id: task.id,
            client_id: task.client_id.clone(),
            step_number: task.step_number,
            tasks: snapshots,
        })
    }

    /// Recompute and persist the aggregate status and report of a workflow.
    ///
    /// Idempotent; writes only when the derived state differs from the
    /// stored one. A derived status that would move the workflow backwards
    /// is refused and the stored status kept.
    #[instrument(skip(self))]
    pub async fn refresh_workflow(&self, workflow_id: Uuid) -> Result<WorkflowStatus, EngineError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await
            .map_err(EngineError::from_workflow_lookup(workflow_id))?;
        let tasks = self.store.list_tasks(workflow_id).await?;
        let results = self.store.list_results(workflow_id).await?;

        let derived = aggregate(&workflow, &tasks, &results);

        if !workflow.status.can_advance_to(derived.status) {
            warn!(
                current = %workflow.status,
                derived = %derived.status,
                "refusing to move workflow status backwards"
            );
            return Ok(workflow.status);
        }

        let report = derived.report.as_ref().map(serde_json::to_value).transpose()?;
        if derived.status == workflow.status && report == workflow.final_result {
            debug!(status = %workflow.status, "workflow aggregate unchanged");
            return Ok(workflow.status);
        }

        self.store
            .update_workflow(workflow_id, derived.status, report.as_ref(), self.time.now())
            .await?;
        info!(from = %workflow.status, to = %derived.status, "workflow status updated");

        Ok(derived.status)
    }
}
