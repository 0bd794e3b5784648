//! Postgres-backed [`Store`]. Thin delegation to the repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{ResultRow, TaskRow, WorkflowRow, WorkflowStatus};
use crate::repository::{results, tasks, workflows};
use crate::{DbError, DbPool, Store};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_workflow(&self, workflow: &WorkflowRow, tasks: &[TaskRow]) -> Result<(), DbError> {
        workflows::insert_workflow_with_tasks(&self.pool, workflow, tasks).await
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<WorkflowRow, DbError> {
        workflows::get_workflow(&self.pool, workflow_id).await
    }

    async fn update_workflow(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        final_result: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        workflows::update_workflow(&self.pool, workflow_id, status, final_result.cloned(), now).await
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskRow>, DbError> {
        tasks::list_tasks(&self.pool, workflow_id).await
    }

    async fn next_ready_task(&self) -> Result<Option<TaskRow>, DbError> {
        tasks::next_ready_task(&self.pool).await
    }

    async fn claim_task(&self, task_id: Uuid, progress: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
        tasks::claim_task(&self.pool, task_id, progress, now).await
    }

    async fn release_task(&self, task_id: Uuid) -> Result<bool, DbError> {
        tasks::release_task(&self.pool, task_id).await
    }

    async fn requeue_in_progress(&self) -> Result<u64, DbError> {
        tasks::requeue_in_progress(&self.pool).await
    }

    async fn complete_task(&self, task_id: Uuid, result: &ResultRow, now: DateTime<Utc>) -> Result<(), DbError> {
        tasks::complete_task(&self.pool, task_id, result, now).await
    }

    async fn fail_task(&self, task_id: Uuid, error: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        tasks::fail_task(&self.pool, task_id, error, now).await
    }

    async fn list_results(&self, workflow_id: Uuid) -> Result<Vec<ResultRow>, DbError> {
        results::list_results(&self.pool, workflow_id).await
    }
}
