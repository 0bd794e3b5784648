//! `api` crate: HTTP surface over the workflow engine.
//!
//! Exposes:
//!   POST /workflow
//!   GET  /workflow/{id}/status
//!   GET  /workflow/{id}/results

mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use db::Store;
use engine::WorkflowFactory;

pub use error::ApiError;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub factory: Arc<WorkflowFactory>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, factory: WorkflowFactory) -> Self {
        Self {
            store,
            factory: Arc::new(factory),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflow", post(handlers::workflows::create))
        .route("/workflow/:id/status", get(handlers::workflows::status))
        .route("/workflow/:id/results", get(handlers::workflows::results))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(addr: &str, state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod api_tests;
