use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::ApiError;
use db::WorkflowStatus;
use engine::queries::{self, WorkflowResultsView, WorkflowStatusView};
use engine::WorkflowDefinition;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowDto {
    pub client_id: String,
    #[serde(default)]
    pub input: Value,
    pub definition: WorkflowDefinition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedWorkflowDto {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub total_tasks: usize,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<CreatedWorkflowDto>), ApiError> {
    let created = state
        .factory
        .create(&payload.definition, &payload.client_id, payload.input)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedWorkflowDto {
            workflow_id: created.workflow.id,
            status: created.workflow.status,
            total_tasks: created.tasks.len(),
        }),
    ))
}

pub async fn status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowStatusView>, ApiError> {
    Ok(Json(queries::workflow_status(state.store.as_ref(), id).await?))
}

pub async fn results(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowResultsView>, ApiError> {
    Ok(Json(queries::workflow_results(state.store.as_ref(), id).await?))
}
