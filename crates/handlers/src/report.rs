//! `reportGeneration`: summarises the other tasks of the workflow.
//!
//! Usually wired as the last step so that it runs after the tasks it
//! reports on. Tasks still queued or running are listed with their current
//! status.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{ExecutionContext, TaskExecutionError, TaskHandler};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskEntry {
    task_id: Uuid,
    #[serde(rename = "type")]
    task_type: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    workflow_id: Uuid,
    tasks: Vec<TaskEntry>,
    final_report: String,
    generated_at: String,
}

pub struct ReportGenerationHandler;

#[async_trait]
impl TaskHandler for ReportGenerationHandler {
    async fn run(&self, _input: &Value, ctx: &ExecutionContext) -> Result<Value, TaskExecutionError> {
        let mut completed = 0usize;
        let mut failed = 0usize;

        let tasks: Vec<TaskEntry> = ctx
            .tasks
            .iter()
            .filter(|t| t.task_id != ctx.task_id)
            .map(|t| {
                let mut entry = TaskEntry {
                    task_id: t.task_id,
                    task_type: t.task_type.clone(),
                    status: t.status.clone(),
                    output: None,
                    error: None,
                };
                match t.status.as_str() {
                    "completed" => {
                        completed += 1;
                        entry.output = t.output.clone();
                    }
                    "failed" => {
                        failed += 1;
                        entry.error = Some(
                            t.error.clone().unwrap_or_else(|| "Task execution failed".into()),
                        );
                    }
                    _ => {}
                }
                entry
            })
            .collect();

        let report = Report {
            workflow_id: ctx.workflow_id,
            tasks,
            final_report: format!(
                "Workflow completed with {completed} successful tasks and {failed} failed tasks."
            ),
            generated_at: Utc::now().to_rfc3339(),
        };

        info!(workflow_id = %ctx.workflow_id, "report generated");

        serde_json::to_value(report).map_err(|e| TaskExecutionError::Failed(e.to_string()))
    }
}
