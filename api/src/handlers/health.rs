use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Health check endpoint
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let pending_jobs = state.engine.pending_count().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "pending_jobs": pending_jobs,
        })),
    )
}
