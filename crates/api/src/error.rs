use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use engine::EngineError;

/// Maps engine errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            EngineError::Validation(_) | EngineError::Configuration { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "message": self.0.to_string() }),
            ),
            EngineError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "message": self.0.to_string() }),
            ),
            EngineError::NotCompleted { status, .. } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "message": "Workflow is not yet completed",
                    "currentStatus": status,
                }),
            ),
            EngineError::Persistence(_) | EngineError::Serialization(_) => {
                error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
