//! `MockHandler`: a test double for `TaskHandler`.
//!
//! Useful in unit and integration tests where a real handler is either
//! unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{traits::ExecutionContext, TaskExecutionError, TaskHandler};

/// Behaviour injected into `MockHandler` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with `TaskExecutionError::Failed`.
    Fail(String),
}

/// A mock handler that records every call it receives and returns a
/// programmer-specified result.
pub struct MockHandler {
    /// Label used in test assertions.
    pub name: String,
    /// What the handler will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// IDs of the tasks this handler ran, in call order.
    pub calls: Arc<Mutex<Vec<Uuid>>>,
}

impl MockHandler {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Fail(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this handler has been run.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Task IDs seen so far, in call order.
    pub fn task_ids(&self) -> Vec<Uuid> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for MockHandler {
    async fn run(&self, _input: &Value, ctx: &ExecutionContext) -> Result<Value, TaskExecutionError> {
        self.calls.lock().unwrap().push(ctx.task_id);

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                // Tag the output with the handler name so tests can trace
                // which handler produced which result.
                let mut out = json!({ "handler": self.name });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(out)
            }
            MockBehaviour::Fail(msg) => Err(TaskExecutionError::Failed(msg.clone())),
        }
    }
}
