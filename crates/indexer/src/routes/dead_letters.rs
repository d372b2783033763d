//! Dead-letter listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use record_store::{DeadLetterEntry, DeadLetterReason};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::launches::{LimitParams, page_size};

#[derive(Debug, Serialize)]
pub struct DeadLetterResponse {
    pub id: String,
    pub source_id: Option<String>,
    pub transfer_id: Option<String>,
    /// `block:tx_index:event_index` of the skipped envelope.
    pub ordering: Option<String>,
    pub reason: &'static str,
    pub detail: String,
    pub envelope: serde_json::Value,
    pub recorded_at: String,
}

impl From<DeadLetterEntry> for DeadLetterResponse {
    fn from(entry: DeadLetterEntry) -> Self {
        let reason = match &entry.reason {
            DeadLetterReason::Malformed { .. } => "malformed",
            DeadLetterReason::MissingLaunch { .. } => "missing_launch",
        };
        Self {
            id: entry.id.to_string(),
            source_id: entry.source_id.map(|s| s.into_inner()),
            transfer_id: entry.transfer_id.map(|t| t.into_inner()),
            ordering: entry.ordering.map(|o| o.to_string()),
            reason,
            detail: entry.reason.to_string(),
            envelope: entry.envelope,
            recorded_at: entry.recorded_at.to_rfc3339(),
        }
    }
}

/// GET /dead-letters: skipped envelopes in the order they were recorded.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<DeadLetterResponse>>, ApiError> {
    let entries = state.reader.dead_letters(page_size(params.limit)?).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
