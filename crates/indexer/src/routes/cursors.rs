//! Ingestion progress per source.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use record_store::{Cursor, SourceId};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct CursorResponse {
    pub source_id: String,
    pub last_applied_block: u64,
    pub last_applied_tx_index: u32,
    pub last_applied_event_index: u32,
    pub updated_at: String,
}

impl From<Cursor> for CursorResponse {
    fn from(cursor: Cursor) -> Self {
        Self {
            last_applied_block: cursor.last_applied_block(),
            last_applied_tx_index: cursor.last_applied_tx_index(),
            last_applied_event_index: cursor.last_applied_event_index(),
            updated_at: cursor.updated_at.to_rfc3339(),
            source_id: cursor.source_id.into_inner(),
        }
    }
}

/// GET /cursors/{source_id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> Result<Json<CursorResponse>, ApiError> {
    let cursor = state
        .reader
        .read_cursor(&SourceId::new(source_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No cursor for source {source_id}")))?;
    Ok(Json(cursor.into()))
}
