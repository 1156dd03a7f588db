use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::service::Coordinator;
use super::types::WorkerSummary;

/// Read-only admin routes served next to the TCP protocol.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/cluster/workers", get(handle_list_workers))
        .route("/arrays/:id", get(handle_get_placement))
        .layer(Extension(coordinator))
}

pub async fn handle_list_workers(
    Extension(coordinator): Extension<Arc<Coordinator>>,
) -> (StatusCode, Json<Vec<WorkerSummary>>) {
    (StatusCode::OK, Json(coordinator.worker_summaries()))
}

pub async fn handle_get_placement(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(array_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match coordinator.placement(&array_id) {
        Some(placement) => match serde_json::to_value(placement) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => {
                tracing::error!("Failed to serialize placement of {}: {}", array_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
            }
        },
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown array: {}", array_id) })),
        ),
    }
}
