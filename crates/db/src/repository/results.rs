//! Task result persistence. Results are insert-only.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{DbError, models::ResultRow};

fn result_from_row(row: &PgRow) -> Result<ResultRow, DbError> {
    Ok(ResultRow {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        data: row.try_get("data")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) async fn insert_result(
    tx: &mut Transaction<'_, Postgres>,
    result: &ResultRow,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO results (id, task_id, data, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(result.id)
    .bind(result.task_id)
    .bind(result.data.clone())
    .bind(result.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Every result produced by the tasks of one workflow.
pub async fn list_results(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<ResultRow>, DbError> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.task_id, r.data, r.created_at
        FROM results r
        JOIN tasks t ON t.id = r.task_id
        WHERE t.workflow_id = $1
        ORDER BY r.created_at ASC, r.id ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(result_from_row).collect()
}
