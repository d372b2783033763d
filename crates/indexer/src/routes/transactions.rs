//! Transaction record lookups.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use record_store::{TokenTransactionRecord, TransferId};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transfer_id: String,
    pub memecoin_address: String,
    pub kind: &'static str,
    pub owner_address: Option<String>,
    pub amount: String,
    pub quote_amount: Option<String>,
    pub block: u64,
}

impl From<TokenTransactionRecord> for TransactionResponse {
    fn from(record: TokenTransactionRecord) -> Self {
        Self {
            transfer_id: record.transfer_id.into_inner(),
            memecoin_address: record.memecoin_address.into_inner(),
            kind: record.kind.as_str(),
            owner_address: record.owner_address,
            amount: record.amount,
            quote_amount: record.quote_amount,
            block: record.created_at_block,
        }
    }
}

/// GET /transactions/{transfer_id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let record = state
        .reader
        .get_transaction(&TransferId::new(transfer_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {transfer_id} not found")))?;
    Ok(Json(record.into()))
}
