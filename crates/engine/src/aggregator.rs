//! Workflow status and final report derivation.
//!
//! Everything here is a pure function of the stored rows: calling
//! [`aggregate`] twice on the same task states yields the same output,
//! down to the serialised bytes. The report timestamp is the latest task
//! `finished_at`, never the wall clock.

use std::collections::HashMap;

use uuid::Uuid;

use db::{ResultRow, TaskRow, TaskStatus, WorkflowRow, WorkflowStatus};

use crate::models::{FinalReport, TaskReport};

/// Error marker for failed tasks that carry no recorded cause.
pub const DEFAULT_ERROR_MARKER: &str = "Task execution failed";

/// Derived state of a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub status: WorkflowStatus,
    /// Present only when `status` is terminal.
    pub report: Option<FinalReport>,
}

/// Failed if any task failed, Completed if all completed, InProgress otherwise.
pub fn derive_status(tasks: &[TaskRow]) -> WorkflowStatus {
    if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        WorkflowStatus::Failed
    } else if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        WorkflowStatus::Completed
    } else {
        WorkflowStatus::InProgress
    }
}

/// Derive the workflow's status and, for terminal workflows, its report.
pub fn aggregate(workflow: &WorkflowRow, tasks: &[TaskRow], results: &[ResultRow]) -> Aggregate {
    let status = derive_status(tasks);
    let report = status
        .is_terminal()
        .then(|| build_report(workflow, status, tasks, results));
    Aggregate { status, report }
}

fn build_report(
    workflow: &WorkflowRow,
    status: WorkflowStatus,
    tasks: &[TaskRow],
    results: &[ResultRow],
) -> FinalReport {
    let results_by_id: HashMap<Uuid, &ResultRow> = results.iter().map(|r| (r.id, r)).collect();

    let mut ordered: Vec<&TaskRow> = tasks.iter().collect();
    ordered.sort_by_key(|t| (t.step_number, t.step_index));

    let entries: Vec<TaskReport> = ordered
        .into_iter()
        .map(|task| TaskReport {
            task_id: task.id,
            task_type: task.task_type.clone(),
            step_number: task.step_number,
            status: task.status,
            output: match task.status {
                TaskStatus::Completed => task
                    .result_id
                    .and_then(|id| results_by_id.get(&id))
                    .map(|r| r.data.clone()),
                _ => None,
            },
            error: match task.status {
                TaskStatus::Failed => Some(
                    task.error
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ERROR_MARKER.to_owned()),
                ),
                _ => None,
            },
            skipped: status == WorkflowStatus::Failed && task.status == TaskStatus::Queued,
        })
        .collect();

    FinalReport {
        workflow_id: workflow.id,
        client_id: workflow.client_id.clone(),
        status,
        completed_at: tasks.iter().filter_map(|t| t.finished_at).max(),
        summary: summary(&entries),
        tasks: entries,
    }
}

fn summary(entries: &[TaskReport]) -> String {
    let completed = entries.iter().filter(|t| t.status == TaskStatus::Completed).count();
    let failed = entries.iter().filter(|t| t.status == TaskStatus::Failed).count();
    let skipped = entries.iter().filter(|t| t.skipped).count();

    let mut text = format!(
        "Workflow completed with {completed} successful tasks and {failed} failed tasks."
    );
    if skipped > 0 {
        text.push_str(&format!(" {skipped} tasks were skipped."));
    }
    text
}
