//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models and carry no scheduling behaviour.
//! Workflow definitions and reports live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow.
///
/// Status only ever moves forward: `Initial → InProgress → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Initial,
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether a workflow currently in `self` may be moved to `next`.
    ///
    /// Staying put is always allowed; otherwise the rank must strictly grow,
    /// which also forbids hopping between the two terminal states.
    pub fn can_advance_to(self, next: Self) -> bool {
        self == next || next.rank() > self.rank()
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial    => write!(f, "initial"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed  => write!(f, "completed"),
            Self::Failed     => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial"     => Ok(Self::Initial),
            "in_progress" => Ok(Self::InProgress),
            "completed"   => Ok(Self::Completed),
            "failed"      => Ok(Self::Failed),
            other         => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// A persisted workflow row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRow {
    pub id: Uuid,
    /// Name of the definition this workflow was materialised from.
    pub name: String,
    pub client_id: String,
    pub status: WorkflowStatus,
    /// Aggregated report, present only once the workflow is terminal.
    pub final_result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

/// Possible statuses for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued     => write!(f, "queued"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed  => write!(f, "completed"),
            Self::Failed     => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued"      => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed"   => Ok(Self::Completed),
            "failed"      => Ok(Self::Failed),
            other         => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A persisted task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub client_id: String,
    /// Step name, unique within the workflow when present.
    pub name: Option<String>,
    /// Selects the handler that runs this task.
    pub task_type: String,
    /// Ordering tie-break only; never a dependency.
    pub step_number: i32,
    /// Index of the step in its definition (creation order).
    pub step_index: i32,
    pub status: TaskStatus,
    pub progress: Option<String>,
    /// The single task in the same workflow that must complete first.
    pub dependency_id: Option<Uuid>,
    /// Set only when `status == Completed`.
    pub result_id: Option<Uuid>,
    /// Failure cause, set only when `status == Failed`.
    pub error: Option<String>,
    /// Task input document (GeoJSON in the bundled handlers).
    pub input: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    /// Ordering key used for ready-task selection and reports.
    pub fn schedule_key(&self) -> (i32, DateTime<Utc>, i32) {
        (self.step_number, self.created_at, self.step_index)
    }
}

// ---------------------------------------------------------------------------
// results
// ---------------------------------------------------------------------------

/// Output of a successfully completed task. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_status_round_trips_through_text() {
        for status in [
            WorkflowStatus::Initial,
            WorkflowStatus::InProgress,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<WorkflowStatus>(), Ok(status));
        }
        assert!("done".parse::<WorkflowStatus>().is_err());
    }

    #[test]
    fn workflow_status_only_moves_forward() {
        use WorkflowStatus::*;
        assert!(Initial.can_advance_to(InProgress));
        assert!(Initial.can_advance_to(Failed));
        assert!(InProgress.can_advance_to(Completed));
        assert!(Failed.can_advance_to(Failed));
        assert!(!Completed.can_advance_to(InProgress));
        assert!(!Failed.can_advance_to(Completed));
        assert!(!InProgress.can_advance_to(Initial));
    }

    #[test]
    fn task_status_serialises_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
    }
}
