//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Ingestion pipeline state, if this instance runs one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<&'static str>,
}

/// GET /health: returns service health and pipeline state.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pipeline: state.pipeline.as_ref().map(|p| p.state().as_str()),
    })
}
