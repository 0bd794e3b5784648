//! Task persistence, including the ready-task query and the conditional
//! status transitions.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    DbError,
    models::{ResultRow, TaskRow},
};

const TASK_COLUMNS: &str = "t.id, t.workflow_id, t.client_id, t.name, t.task_type, t.step_number, \
     t.step_index, t.status, t.progress, t.dependency_id, t.result_id, t.error, t.input, \
     t.created_at, t.started_at, t.finished_at";

fn task_from_row(row: &PgRow) -> Result<TaskRow, DbError> {
    let status: String = row.try_get("status")?;
    Ok(TaskRow {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        client_id: row.try_get("client_id")?,
        name: row.try_get("name")?,
        task_type: row.try_get("task_type")?,
        step_number: row.try_get("step_number")?,
        step_index: row.try_get("step_index")?,
        status: status.parse().map_err(DbError::Corrupt)?,
        progress: row.try_get("progress")?,
        dependency_id: row.try_get("dependency_id")?,
        result_id: row.try_get("result_id")?,
        error: row.try_get("error")?,
        input: row.try_get("input")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

pub(crate) async fn insert_task(
    tx: &mut Transaction<'_, Postgres>,
    task: &TaskRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO tasks
            (id, workflow_id, client_id, name, task_type, step_number, step_index, status,
             progress, dependency_id, result_id, error, input, created_at, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(task.id)
    .bind(task.workflow_id)
    .bind(&task.client_id)
    .bind(&task.name)
    .bind(&task.task_type)
    .bind(task.step_number)
    .bind(task.step_index)
    .bind(task.status.to_string())
    .bind(&task.progress)
    .bind(task.dependency_id)
    .bind(task.result_id)
    .bind(&task.error)
    .bind(task.input.clone())
    .bind(task.created_at)
    .bind(task.started_at)
    .bind(task.finished_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// All tasks of a workflow in report order.
pub async fn list_tasks(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.workflow_id = $1 \
         ORDER BY t.step_number ASC, t.step_index ASC"
    ))
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(task_from_row).collect()
}

/// The first queued task whose dependency is absent or completed.
///
/// Selection happens entirely in the database; the caller still has to
/// [`claim_task`] the row before running it.
pub async fn next_ready_task(pool: &PgPool) -> Result<Option<TaskRow>, DbError> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {TASK_COLUMNS}
        FROM tasks t
        LEFT JOIN tasks d ON d.id = t.dependency_id
        WHERE t.status = 'queued'
          AND (t.dependency_id IS NULL OR d.status = 'completed')
        ORDER BY t.step_number ASC, t.created_at ASC, t.step_index ASC
        LIMIT 1
        "#
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// Atomically move a task from `queued` to `in_progress`.
///
/// Returns `false` if another worker got there first.
pub async fn claim_task(
    pool: &PgPool,
    id: Uuid,
    progress: &str,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'in_progress', progress = $1, started_at = $2
        WHERE id = $3 AND status = 'queued'
        "#,
    )
    .bind(progress)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Atomically move a task from `in_progress` back to `queued`.
pub async fn release_task(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'queued', progress = NULL, started_at = NULL
        WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Requeue every task left `in_progress`.
pub async fn requeue_in_progress(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'queued', progress = NULL, started_at = NULL
        WHERE status = 'in_progress'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Store the result and mark the task completed, in one transaction.
pub async fn complete_task(
    pool: &PgPool,
    id: Uuid,
    result: &ResultRow,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    super::results::insert_result(&mut tx, result).await?;

    let updated = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'completed', result_id = $1, progress = NULL, finished_at = $2
        WHERE id = $3 AND status = 'in_progress'
        "#,
    )
    .bind(result.id)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::Conflict(format!("task {id} is not in progress")));
    }

    tx.commit().await?;
    Ok(())
}

/// Mark a running task failed.
pub async fn fail_task(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let updated = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'failed', error = $1, progress = NULL, finished_at = $2
        WHERE id = $3 AND status = 'in_progress'
        "#,
    )
    .bind(error)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DbError::Conflict(format!("task {id} is not in progress")));
    }

    Ok(())
}
