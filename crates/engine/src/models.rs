//! Workflow definitions and aggregated reports.
//!
//! A [`WorkflowDefinition`] is what a user writes (YAML or JSON, camelCase
//! keys). A [`FinalReport`] is what the aggregator stores on a workflow
//! once it reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::{TaskStatus, WorkflowStatus};

use crate::ValidationError;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One step of a workflow definition, materialised into a single task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Maps to a registered `TaskHandler`.
    pub task_type: String,
    /// Ordering tie-break; need not be unique or contiguous.
    pub step_number: i32,
    /// Unique within the workflow when present; target of `depends_on`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name of the step that must complete before this one may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
}

impl StepDefinition {
    /// Human-readable label for logs and errors.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{index} ({})", self.task_type),
        }
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Parse a definition from YAML (JSON is accepted too, being a subset).
    pub fn from_yaml(content: &str) -> Result<Self, ValidationError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Task types referenced by the steps, in step order.
    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.task_type.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Per-task entry of a [`FinalReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: Uuid,
    pub task_type: String,
    pub step_number: i32,
    pub status: TaskStatus,
    /// The task's result data, for completed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure cause, for failed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The task never ran because the workflow failed first.
    pub skipped: bool,
}

/// Aggregated outcome of a terminal workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub workflow_id: Uuid,
    pub client_id: String,
    pub status: WorkflowStatus,
    /// Latest `finished_at` among the workflow's tasks.
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: String,
    /// Ordered by ascending step number.
    pub tasks: Vec<TaskReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_definition_with_optional_fields() {
        let yaml = r#"
name: example_workflow
steps:
  - taskType: polygonArea
    stepNumber: 1
    name: area
  - taskType: reportGeneration
    stepNumber: 2
    dependsOn: area
"#;
        let def = WorkflowDefinition::from_yaml(yaml).expect("valid yaml");
        assert_eq!(def.name, "example_workflow");
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.steps[0].name.as_deref(), Some("area"));
        assert_eq!(def.steps[1].name, None);
        assert_eq!(def.steps[1].depends_on.as_deref(), Some("area"));
        assert_eq!(def.steps[1].label(1), "#1 (reportGeneration)");
    }

    #[test]
    fn missing_task_type_is_a_parse_error() {
        let yaml = "name: bad\nsteps:\n  - stepNumber: 1\n";
        assert!(matches!(
            WorkflowDefinition::from_yaml(yaml),
            Err(ValidationError::Parse(_))
        ));
    }

    #[test]
    fn report_serialises_camel_case_and_omits_absent_fields() {
        let report = TaskReport {
            task_id: Uuid::nil(),
            task_type: "polygonArea".into(),
            step_number: 1,
            status: TaskStatus::Queued,
            output: None,
            error: None,
            skipped: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["taskType"], "polygonArea");
        assert_eq!(json["status"], "queued");
        assert!(json.get("output").is_none());
        assert_eq!(json["skipped"], true);
    }
}
