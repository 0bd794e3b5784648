//! In-memory [`Store`] used by tests and single-process runs.
//!
//! All state sits behind one async mutex, so every operation (including the
//! conditional transitions) is atomic with respect to every other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ResultRow, TaskRow, TaskStatus, WorkflowRow, WorkflowStatus};
use crate::{DbError, Store};

#[derive(Default)]
struct Inner {
    workflows: HashMap<Uuid, WorkflowRow>,
    tasks: HashMap<Uuid, TaskRow>,
    results: HashMap<Uuid, ResultRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`DbError::Unavailable`] until
    /// switched back. Simulates an outage of the backing database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored workflows.
    pub async fn workflow_count(&self) -> usize {
        self.inner.lock().await.workflows.len()
    }

    /// Number of stored tasks, across all workflows.
    pub async fn task_count(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    /// Number of stored results, across all workflows.
    pub async fn result_count(&self) -> usize {
        self.inner.lock().await.results.len()
    }

    fn check(&self) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

fn sorted_tasks<'a>(tasks: impl Iterator<Item = &'a TaskRow>) -> Vec<TaskRow> {
    let mut out: Vec<TaskRow> = tasks.cloned().collect();
    out.sort_by_key(|t| (t.step_number, t.step_index));
    out
}

fn requeue(task: &mut TaskRow) {
    task.status = TaskStatus::Queued;
    task.progress = None;
    task.started_at = None;
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_workflow(&self, workflow: &WorkflowRow, tasks: &[TaskRow]) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;

        if inner.workflows.contains_key(&workflow.id) {
            return Err(DbError::Conflict(format!("workflow {} already exists", workflow.id)));
        }
        if let Some(dup) = tasks.iter().find(|t| inner.tasks.contains_key(&t.id)) {
            return Err(DbError::Conflict(format!("task {} already exists", dup.id)));
        }

        inner.workflows.insert(workflow.id, workflow.clone());
        for task in tasks {
            inner.tasks.insert(task.id, task.clone());
        }
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<WorkflowRow, DbError> {
        self.check()?;
        let inner = self.inner.lock().await;
        inner.workflows.get(&workflow_id).cloned().ok_or(DbError::NotFound)
    }

    async fn update_workflow(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        final_result: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let workflow = inner.workflows.get_mut(&workflow_id).ok_or(DbError::NotFound)?;
        workflow.status = status;
        workflow.final_result = final_result.cloned();
        workflow.updated_at = now;
        Ok(())
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskRow>, DbError> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(sorted_tasks(inner.tasks.values().filter(|t| t.workflow_id == workflow_id)))
    }

    async fn next_ready_task(&self) -> Result<Option<TaskRow>, DbError> {
        self.check()?;
        let inner = self.inner.lock().await;

        let ready = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .filter(|t| match t.dependency_id {
                None => true,
                Some(dep) => inner
                    .tasks
                    .get(&dep)
                    .is_some_and(|d| d.status == TaskStatus::Completed),
            })
            .min_by_key(|t| t.schedule_key());

        Ok(ready.cloned())
    }

    async fn claim_task(&self, task_id: Uuid, progress: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&task_id).ok_or(DbError::NotFound)?;

        if task.status != TaskStatus::Queued {
            return Ok(false);
        }
        task.status = TaskStatus::InProgress;
        task.progress = Some(progress.to_owned());
        task.started_at = Some(now);
        Ok(true)
    }

    async fn release_task(&self, task_id: Uuid) -> Result<bool, DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&task_id).ok_or(DbError::NotFound)?;

        if task.status != TaskStatus::InProgress {
            return Ok(false);
        }
        requeue(task);
        Ok(true)
    }

    async fn requeue_in_progress(&self) -> Result<u64, DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let mut moved = 0;
        for task in inner.tasks.values_mut().filter(|t| t.status == TaskStatus::InProgress) {
            requeue(task);
            moved += 1;
        }
        Ok(moved)
    }

    async fn complete_task(&self, task_id: Uuid, result: &ResultRow, now: DateTime<Utc>) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&task_id).ok_or(DbError::NotFound)?;

        if task.status != TaskStatus::InProgress {
            return Err(DbError::Conflict(format!(
                "task {task_id} is {} and cannot complete",
                task.status
            )));
        }
        task.status = TaskStatus::Completed;
        task.result_id = Some(result.id);
        task.progress = None;
        task.finished_at = Some(now);
        inner.results.insert(result.id, result.clone());
        Ok(())
    }

    async fn fail_task(&self, task_id: Uuid, error: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&task_id).ok_or(DbError::NotFound)?;

        if task.status != TaskStatus::InProgress {
            return Err(DbError::Conflict(format!(
                "task {task_id} is {} and cannot fail",
                task.status
            )));
        }
        task.status = TaskStatus::Failed;
        task.error = Some(error.to_owned());
        task.progress = None;
        task.finished_at = Some(now);
        Ok(())
    }

    async fn list_results(&self, workflow_id: Uuid) -> Result<Vec<ResultRow>, DbError> {
        self.check()?;
        let inner = self.inner.lock().await;
        let mut results: Vec<ResultRow> = inner
            .results
            .values()
            .filter(|r| {
                inner
                    .tasks
                    .get(&r.task_id)
                    .is_some_and(|t| t.workflow_id == workflow_id)
            })
            .cloned()
            .collect();
        results.sort_by_key(|r| (r.created_at, r.id));
        Ok(results)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn workflow(created_at: DateTime<Utc>) -> WorkflowRow {
        WorkflowRow {
            id: Uuid::new_v4(),
            name: "test".into(),
            client_id: "client".into(),
            status: WorkflowStatus::Initial,
            final_result: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn task(wf: &WorkflowRow, step_number: i32, step_index: i32, dependency_id: Option<Uuid>) -> TaskRow {
        TaskRow {
            id: Uuid::new_v4(),
            workflow_id: wf.id,
            client_id: wf.client_id.clone(),
            name: None,
            task_type: "mock".into(),
            step_number,
            step_index,
            status: TaskStatus::Queued,
            progress: None,
            dependency_id,
            result_id: None,
            error: None,
            input: json!({}),
            created_at: wf.created_at,
            started_at: None,
            finished_at: None,
        }
    }

    fn result_for(task_id: Uuid) -> ResultRow {
        ResultRow { id: Uuid::new_v4(), task_id, data: json!({ "ok": true }), created_at: Utc::now() }
    }

    #[tokio::test]
    async fn ready_task_prefers_lowest_step_number_then_creation_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let older = workflow(now - Duration::seconds(10));
        let newer = workflow(now);

        let a = task(&newer, 1, 0, None);
        let b = task(&older, 2, 0, None);
        let c = task(&older, 1, 1, None);
        store.insert_workflow(&newer, &[a.clone()]).await.unwrap();
        store.insert_workflow(&older, &[b.clone(), c.clone()]).await.unwrap();

        // Same step number: the older workflow's task wins.
        let next = store.next_ready_task().await.unwrap().unwrap();
        assert_eq!(next.id, c.id);
    }

    #[tokio::test]
    async fn task_with_pending_or_failed_dependency_is_not_ready() {
        let store = MemoryStore::new();
        let wf = workflow(Utc::now());
        let first = task(&wf, 1, 0, None);
        let second = task(&wf, 2, 1, Some(first.id));
        store.insert_workflow(&wf, &[first.clone(), second.clone()]).await.unwrap();

        assert!(store.claim_task(first.id, "starting", Utc::now()).await.unwrap());
        // first is in progress: nothing else is ready.
        assert!(store.next_ready_task().await.unwrap().is_none());

        store.fail_task(first.id, "boom", Utc::now()).await.unwrap();
        assert!(store.next_ready_task().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_dependency_releases_dependent() {
        let store = MemoryStore::new();
        let wf = workflow(Utc::now());
        let first = task(&wf, 1, 0, None);
        let second = task(&wf, 2, 1, Some(first.id));
        store.insert_workflow(&wf, &[first.clone(), second.clone()]).await.unwrap();

        store.claim_task(first.id, "starting", Utc::now()).await.unwrap();
        store.complete_task(first.id, &result_for(first.id), Utc::now()).await.unwrap();

        let next = store.next_ready_task().await.unwrap().unwrap();
        assert_eq!(next.id, second.id);
    }

    #[tokio::test]
    async fn claim_is_compare_and_set() {
        let store = MemoryStore::new();
        let wf = workflow(Utc::now());
        let t = task(&wf, 1, 0, None);
        store.insert_workflow(&wf, &[t.clone()]).await.unwrap();

        assert!(store.claim_task(t.id, "starting", Utc::now()).await.unwrap());
        assert!(!store.claim_task(t.id, "starting", Utc::now()).await.unwrap());

        let stored = &store.list_tasks(wf.id).await.unwrap()[0];
        assert_eq!(stored.status, TaskStatus::InProgress);
        assert_eq!(stored.progress.as_deref(), Some("starting"));
    }

    #[tokio::test]
    async fn released_claim_makes_task_ready_again() {
        let store = MemoryStore::new();
        let wf = workflow(Utc::now());
        let t = task(&wf, 1, 0, None);
        store.insert_workflow(&wf, &[t.clone()]).await.unwrap();

        assert!(!store.release_task(t.id).await.unwrap());
        store.claim_task(t.id, "starting", Utc::now()).await.unwrap();
        assert!(store.next_ready_task().await.unwrap().is_none());

        assert!(store.release_task(t.id).await.unwrap());
        let next = store.next_ready_task().await.unwrap().unwrap();
        assert_eq!(next.id, t.id);
        assert!(next.progress.is_none() && next.started_at.is_none());
    }

    #[tokio::test]
    async fn requeue_only_touches_in_progress_tasks() {
        let store = MemoryStore::new();
        let wf = workflow(Utc::now());
        let done = task(&wf, 1, 0, None);
        let stuck = task(&wf, 2, 1, None);
        let waiting = task(&wf, 3, 2, None);
        store.insert_workflow(&wf, &[done.clone(), stuck.clone(), waiting.clone()]).await.unwrap();
        store.claim_task(done.id, "starting", Utc::now()).await.unwrap();
        store.complete_task(done.id, &result_for(done.id), Utc::now()).await.unwrap();
        store.claim_task(stuck.id, "starting", Utc::now()).await.unwrap();

        assert_eq!(store.requeue_in_progress().await.unwrap(), 1);

        let statuses: Vec<TaskStatus> =
            store.list_tasks(wf.id).await.unwrap().into_iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![TaskStatus::Completed, TaskStatus::Queued, TaskStatus::Queued]);
    }

    #[tokio::test]
    async fn terminal_tasks_are_immutable() {
        let store = MemoryStore::new();
        let wf = workflow(Utc::now());
        let t = task(&wf, 1, 0, None);
        store.insert_workflow(&wf, &[t.clone()]).await.unwrap();
        store.claim_task(t.id, "starting", Utc::now()).await.unwrap();
        store.complete_task(t.id, &result_for(t.id), Utc::now()).await.unwrap();

        assert!(matches!(
            store.fail_task(t.id, "late", Utc::now()).await,
            Err(DbError::Conflict(_))
        ));
        assert!(matches!(
            store.complete_task(t.id, &result_for(t.id), Utc::now()).await,
            Err(DbError::Conflict(_))
        ));
        assert_eq!(store.result_count().await, 1);
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.next_ready_task().await, Err(DbError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.next_ready_task().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get_workflow(Uuid::new_v4()).await, Err(DbError::NotFound)));
    }
}
