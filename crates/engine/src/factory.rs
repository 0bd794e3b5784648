//! Workflow materialisation.
//!
//! `WorkflowFactory` turns a [`WorkflowDefinition`] into one stored workflow
//! (status `initial`) and one queued task per step, with `dependsOn` names
//! resolved to task IDs. Every check runs before anything is written, and
//! the workflow and its tasks are persisted in a single store call, so a
//! rejected definition leaves nothing behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::{Store, TaskRow, TaskStatus, WorkflowRow, WorkflowStatus};
use handlers::HandlerRegistry;

use crate::dag::validate_definition;
use crate::models::WorkflowDefinition;
use crate::time::TimeSource;
use crate::EngineError;

/// A freshly created workflow together with its tasks, in step order.
#[derive(Debug, Clone)]
pub struct MaterializedWorkflow {
    pub workflow: WorkflowRow,
    pub tasks: Vec<TaskRow>,
}

pub struct WorkflowFactory {
    store: Arc<dyn Store>,
    time: Arc<dyn TimeSource>,
    /// When set, every step's task type must have a registered handler.
    registry: Option<HandlerRegistry>,
}

impl WorkflowFactory {
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeSource>) -> Self {
        Self { store, time, registry: None }
    }

    /// Reject definitions that reference unregistered task types at creation
    /// time instead of failing the task at dispatch time.
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Parse `yaml` and [`create`](Self::create) the workflow it describes.
    pub async fn create_from_yaml(
        &self,
        yaml: &str,
        client_id: &str,
        input: Value,
    ) -> Result<MaterializedWorkflow, EngineError> {
        let definition = WorkflowDefinition::from_yaml(yaml)?;
        self.create(&definition, client_id, input).await
    }

    /// Validate `definition` and persist the workflow and its tasks.
    ///
    /// Every task receives the same `input` document.
    ///
    /// # Errors
    /// - [`EngineError::Validation`] for malformed definitions, unknown
    ///   `dependsOn` references, or dependency cycles.
    /// - [`EngineError::Configuration`] if a registry is attached and a task
    ///   type has no handler.
    /// - [`EngineError::Persistence`] if the store write fails.
    #[instrument(skip(self, definition, input), fields(workflow_name = %definition.name))]
    pub async fn create(
        &self,
        definition: &WorkflowDefinition,
        client_id: &str,
        input: Value,
    ) -> Result<MaterializedWorkflow, EngineError> {
        let graph = validate_definition(definition).map_err(|e| {
            warn!(error = %e, "workflow definition rejected");
            EngineError::from(e)
        })?;

        if let Some(registry) = &self.registry {
            if let Some(index) = definition
                .steps
                .iter()
                .position(|s| !registry.contains(&s.task_type))
            {
                let step = &definition.steps[index];
                warn!(task_type = %step.task_type, step = %step.label(index), "no handler registered");
                return Err(EngineError::Configuration {
                    task_type: step.task_type.clone(),
                    step: step.label(index),
                });
            }
        }

        let now = self.time.now();
        let workflow = WorkflowRow {
            id: Uuid::new_v4(),
            name: definition.name.clone(),
            client_id: client_id.to_owned(),
            status: WorkflowStatus::Initial,
            final_result: None,
            created_at: now,
            updated_at: now,
        };
        let tasks = materialize_tasks(definition, &graph.dependencies, &workflow, &input, now);

        self.store.insert_workflow(&workflow, &tasks).await.map_err(|e| {
            warn!(workflow_id = %workflow.id, error = %e, "failed to persist workflow");
            EngineError::from(e)
        })?;

        info!(
            workflow_id = %workflow.id,
            client_id,
            tasks = tasks.len(),
            "workflow created"
        );

        Ok(MaterializedWorkflow { workflow, tasks })
    }
}

/// One queued task per step, with dependency indices mapped to task IDs.
fn materialize_tasks(
    definition: &WorkflowDefinition,
    dependencies: &[Option<usize>],
    workflow: &WorkflowRow,
    input: &Value,
    now: DateTime<Utc>,
) -> Vec<TaskRow> {
    let ids: Vec<Uuid> = definition.steps.iter().map(|_| Uuid::new_v4()).collect();

    definition
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| TaskRow {
            id: ids[index],
            workflow_id: workflow.id,
            client_id: workflow.client_id.clone(),
            name: step.name.clone(),
            task_type: step.task_type.clone(),
            step_number: step.step_number,
            step_index: index as i32,
            status: TaskStatus::Queued,
            progress: None,
            dependency_id: dependencies[index].map(|dep| ids[dep]),
            result_id: None,
            error: None,
            input: input.clone(),
            created_at: now,
            started_at: None,
            finished_at: None,
        })
        .collect()
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use crate::ValidationError;
    use db::MemoryStore;
    use serde_json::json;

    fn factory(store: Arc<MemoryStore>) -> WorkflowFactory {
        WorkflowFactory::new(store, Arc::new(ManualClock::default()))
    }

    const ANALYSIS_YAML: &str = r#"
name: example_workflow
steps:
  - taskType: polygonArea
    stepNumber: 1
    name: area
  - taskType: polygonArea
    stepNumber: 2
    name: second_area
  - taskType: reportGeneration
    stepNumber: 3
    dependsOn: area
"#;

    #[tokio::test]
    async fn creates_initial_workflow_with_queued_tasks() {
        let store = Arc::new(MemoryStore::new());
        let created = factory(store.clone())
            .create_from_yaml(ANALYSIS_YAML, "client-1", json!({ "type": "Polygon" }))
            .await
            .expect("valid definition");

        assert_eq!(created.workflow.status, WorkflowStatus::Initial);
        assert_eq!(created.workflow.name, "example_workflow");

        let stored = store.list_tasks(created.workflow.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|t| t.status == TaskStatus::Queued));
        assert!(stored.iter().all(|t| t.client_id == "client-1"));
        assert!(stored.iter().all(|t| t.input == json!({ "type": "Polygon" })));

        // The report step depends on the task created for the "area" step.
        assert_eq!(stored[2].dependency_id, Some(stored[0].id));
        assert_eq!(stored[0].dependency_id, None);
        assert_eq!(stored[1].dependency_id, None);
    }

    #[tokio::test]
    async fn dependency_resolution_ignores_step_numbers() {
        let yaml = r#"
name: renumbered
steps:
  - taskType: a
    stepNumber: 7
    name: first
  - taskType: b
    stepNumber: 7
    dependsOn: first
"#;
        let store = Arc::new(MemoryStore::new());
        let created = factory(store).create_from_yaml(yaml, "c", json!(null)).await.unwrap();
        assert_eq!(created.tasks[1].dependency_id, Some(created.tasks[0].id));
        assert_eq!(created.tasks[1].step_index, 1);
    }

    #[tokio::test]
    async fn cyclic_definition_persists_nothing() {
        let yaml = r#"
name: cyclic
steps:
  - taskType: a
    stepNumber: 1
    name: x
    dependsOn: y
  - taskType: b
    stepNumber: 2
    name: y
    dependsOn: x
"#;
        let store = Arc::new(MemoryStore::new());
        let err = factory(store.clone())
            .create_from_yaml(yaml, "c", json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::CycleDetected { .. })
        ));
        assert_eq!(store.workflow_count().await, 0);
        assert_eq!(store.task_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected() {
        let yaml = "name: bad\nsteps:\n  - taskType: a\n    stepNumber: 1\n    dependsOn: nowhere\n";
        let store = Arc::new(MemoryStore::new());
        let err = factory(store.clone()).create_from_yaml(yaml, "c", json!({})).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::UnknownDependency { .. })
        ));
        assert_eq!(store.workflow_count().await, 0);
        assert_eq!(store.task_count().await, 0);
    }

    #[tokio::test]
    async fn registry_rejects_unregistered_task_types_eagerly() {
        let store = Arc::new(MemoryStore::new());
        let factory = factory(store.clone()).with_registry(HandlerRegistry::with_builtins());

        let yaml = "name: w\nsteps:\n  - taskType: polygonArea\n    stepNumber: 1\n  - taskType: teleport\n    stepNumber: 2\n";
        let err = factory.create_from_yaml(yaml, "c", json!({})).await.unwrap_err();

        assert!(matches!(err, EngineError::Configuration { ref task_type, .. } if task_type == "teleport"));
        assert_eq!(store.workflow_count().await, 0);
        assert_eq!(store.task_count().await, 0);
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_persistence_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let err = factory(store).create_from_yaml(ANALYSIS_YAML, "c", json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
    }
}
