//! Projected records and the per-source cursor.

use chrono::{DateTime, Utc};
use common::{MemecoinAddress, SourceId, TransferId, TxHash};
use events::OrderingKey;
use serde::{Deserialize, Serialize};

/// A memecoin launch as seen by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLaunchRecord {
    /// Primary key.
    pub transaction_hash: TxHash,
    /// Unique; the stable identity of the launched token.
    pub memecoin_address: MemecoinAddress,
    pub owner_address: String,
    pub quote_token: Option<String>,
    pub total_supply: String,
    /// Monotonic: once true, never reset.
    pub is_liquidity_added: bool,
    pub created_at_block: u64,
    pub liquidity_added_at_block: Option<u64>,
}

impl TokenLaunchRecord {
    /// Applies a patch in place, returning true if the record changed.
    pub fn apply_patch(&mut self, patch: &LaunchPatch) -> bool {
        match patch {
            LaunchPatch::LiquidityAdded { at_block } => {
                if self.is_liquidity_added {
                    return false;
                }
                self.is_liquidity_added = true;
                self.liquidity_added_at_block = Some(*at_block);
                true
            }
        }
    }
}

/// A mutation of an existing launch record.
///
/// There is deliberately no variant that clears the liquidity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchPatch {
    LiquidityAdded { at_block: u64 },
}

/// What kind of event produced a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Launch,
    LiquidityAdded,
    Buy,
    Sell,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Launch => "launch",
            TransactionKind::LiquidityAdded => "liquidity_added",
            TransactionKind::Buy => "buy",
            TransactionKind::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "launch" => Ok(TransactionKind::Launch),
            "liquidity_added" => Ok(TransactionKind::LiquidityAdded),
            "buy" => Ok(TransactionKind::Buy),
            "sell" => Ok(TransactionKind::Sell),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// One applied event. Created exactly once per transfer ID, immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransactionRecord {
    /// Primary key, equal to the envelope's transfer ID.
    pub transfer_id: TransferId,
    /// Weak reference to [`TokenLaunchRecord::memecoin_address`].
    pub memecoin_address: MemecoinAddress,
    pub kind: TransactionKind,
    pub owner_address: Option<String>,
    pub amount: String,
    pub quote_amount: Option<String>,
    pub created_at_block: u64,
}

/// Durable progress marker for one event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub source_id: SourceId,
    /// Ordering key of the last envelope whose batch fully committed.
    pub position: OrderingKey,
    pub updated_at: DateTime<Utc>,
}

impl Cursor {
    pub fn new(source_id: SourceId, position: OrderingKey) -> Self {
        Self {
            source_id,
            position,
            updated_at: Utc::now(),
        }
    }

    pub fn last_applied_block(&self) -> u64 {
        self.position.block
    }

    pub fn last_applied_tx_index(&self) -> u32 {
        self.position.tx_index
    }

    pub fn last_applied_event_index(&self) -> u32 {
        self.position.event_index
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.source_id, self.position)
    }
}
