//! Maps task-type tags to handler implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{PolygonAreaHandler, ReportGenerationHandler, TaskHandler};

/// Task-type tag of [`PolygonAreaHandler`].
pub const POLYGON_AREA: &str = "polygonArea";
/// Task-type tag of [`ReportGenerationHandler`].
pub const REPORT_GENERATION: &str = "reportGeneration";

/// Registry of handlers keyed by task type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in handler registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(POLYGON_AREA, Arc::new(PolygonAreaHandler));
        registry.register(REPORT_GENERATION, Arc::new(ReportGenerationHandler));
        registry
    }

    /// Register `handler` for `task_type`, replacing any previous one.
    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(task_type.into(), handler);
        self
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// The subset of `task_types` with no registered handler, deduplicated
    /// and in first-seen order.
    pub fn missing<'a>(&self, task_types: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let mut missing: Vec<&str> = Vec::new();
        for task_type in task_types {
            if !self.contains(task_type) && !missing.contains(&task_type) {
                missing.push(task_type);
            }
        }
        missing
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHandler;
    use serde_json::json;

    #[test]
    fn builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.contains(POLYGON_AREA));
        assert!(registry.contains(REPORT_GENERATION));
        assert_eq!(
            registry.task_types().collect::<Vec<_>>(),
            vec![POLYGON_AREA, REPORT_GENERATION]
        );
    }

    #[test]
    fn missing_reports_each_unknown_type_once() {
        let mut registry = HandlerRegistry::new();
        registry.register("known", Arc::new(MockHandler::returning("known", json!({}))));

        let missing = registry.missing(["known", "ghost", "other", "ghost"]);
        assert_eq!(missing, vec!["ghost", "other"]);
    }

    #[tokio::test]
    async fn register_replaces_existing_handler() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("t", Arc::new(MockHandler::returning("first", json!({}))))
            .register("t", Arc::new(MockHandler::returning("second", json!({}))));

        let ctx = crate::ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            task_id: uuid::Uuid::new_v4(),
            client_id: "client".into(),
            step_number: 1,
            tasks: Vec::new(),
        };
        let out = registry.get("t").unwrap().run(&json!({}), &ctx).await.unwrap();
        assert_eq!(out["handler"], "second");
        assert!(registry.get("nope").is_none());
    }
}
