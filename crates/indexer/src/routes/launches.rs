//! Launch listing and lookups.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use record_store::{LaunchQuery, MemecoinAddress, TokenLaunchRecord, TxHash};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::transactions::TransactionResponse;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListLaunchesParams {
    pub liquidity_added: Option<bool>,
    pub owner: Option<String>,
    pub from_block: Option<u64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub transaction_hash: String,
    pub memecoin_address: String,
    pub owner_address: String,
    pub quote_token: Option<String>,
    pub total_supply: String,
    pub is_liquidity_added: bool,
    pub created_at_block: u64,
    pub liquidity_added_at_block: Option<u64>,
}

impl From<TokenLaunchRecord> for LaunchResponse {
    fn from(record: TokenLaunchRecord) -> Self {
        Self {
            transaction_hash: record.transaction_hash.into_inner(),
            memecoin_address: record.memecoin_address.into_inner(),
            owner_address: record.owner_address,
            quote_token: record.quote_token,
            total_supply: record.total_supply,
            is_liquidity_added: record.is_liquidity_added,
            created_at_block: record.created_at_block,
            liquidity_added_at_block: record.liquidity_added_at_block,
        }
    }
}

/// Clamps a requested page size to `1..=MAX_LIMIT`.
pub(crate) fn page_size(limit: Option<usize>) -> Result<usize, ApiError> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(0) => Err(ApiError::BadRequest("limit must be positive".to_string())),
        Some(n) => Ok(n.min(MAX_LIMIT)),
    }
}

// -- Handlers --

/// GET /launches: list launches, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListLaunchesParams>,
) -> Result<Json<Vec<LaunchResponse>>, ApiError> {
    let mut query = LaunchQuery::new().limit(page_size(params.limit)?);
    if let Some(added) = params.liquidity_added {
        query = query.liquidity_added(added);
    }
    if let Some(owner) = params.owner {
        query = query.owner_address(owner);
    }
    if let Some(block) = params.from_block {
        query = query.from_block(block);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let launches = state.reader.query_launches(query).await?;
    Ok(Json(launches.into_iter().map(Into::into).collect()))
}

/// GET /launches/{address}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<LaunchResponse>, ApiError> {
    let record = state
        .reader
        .get_launch_by_address(&MemecoinAddress::new(address.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Launch for {address} not found")))?;
    Ok(Json(record.into()))
}

/// GET /launches/by-tx/{hash}
#[tracing::instrument(skip(state))]
pub async fn get_by_tx(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<LaunchResponse>, ApiError> {
    let record = state
        .reader
        .get_launch_by_tx_hash(&TxHash::new(hash.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Launch with transaction {hash} not found")))?;
    Ok(Json(record.into()))
}

/// GET /launches/{address}/transactions: transactions for a token, oldest
/// block first.
///
/// Transfers are kept even when no launch is known for the address, so this
/// does not 404 on an unknown launch.
#[tracing::instrument(skip(state))]
pub async fn transactions(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let records = state
        .reader
        .transactions_for_address(&MemecoinAddress::new(address), page_size(params.limit)?)
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}
