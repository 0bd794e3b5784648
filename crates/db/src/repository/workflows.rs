//! Workflow persistence.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    DbError,
    models::{TaskRow, WorkflowRow, WorkflowStatus},
};

pub(crate) fn workflow_from_row(row: &PgRow) -> Result<WorkflowRow, DbError> {
    let status: String = row.try_get("status")?;
    Ok(WorkflowRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        client_id: row.try_get("client_id")?,
        status: status.parse().map_err(DbError::Corrupt)?,
        final_result: row.try_get("final_result")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a workflow and all of its tasks inside one transaction.
///
/// The `tasks.dependency_id` foreign key is deferred, so tasks may reference
/// siblings inserted later in the same batch.
pub async fn insert_workflow_with_tasks(
    pool: &PgPool,
    workflow: &WorkflowRow,
    tasks: &[TaskRow],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, client_id, status, final_result, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(workflow.id)
    .bind(&workflow.name)
    .bind(&workflow.client_id)
    .bind(workflow.status.to_string())
    .bind(workflow.final_result.clone())
    .bind(workflow.created_at)
    .bind(workflow.updated_at)
    .execute(&mut *tx)
    .await?;

    for task in tasks {
        super::tasks::insert_task(&mut tx, task).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query(
        r#"
        SELECT id, name, client_id, status, final_result, created_at, updated_at
        FROM workflows
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    workflow_from_row(&row)
}

/// Overwrite the aggregated status and report of a workflow.
pub async fn update_workflow(
    pool: &PgPool,
    id: Uuid,
    status: WorkflowStatus,
    final_result: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET status = $1, final_result = $2, updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(status.to_string())
    .bind(final_result)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
