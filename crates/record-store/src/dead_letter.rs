//! Append-only record of permanently skipped events.

use chrono::{DateTime, Utc};
use common::{MemecoinAddress, SourceId, TransferId};
use events::OrderingKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadLetterId(Uuid);

impl DeadLetterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DeadLetterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeadLetterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an event was skipped for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The envelope failed validation.
    Malformed { detail: String },
    /// Liquidity was reported for a token with no known launch.
    MissingLaunch { memecoin_address: MemecoinAddress },
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadLetterReason::Malformed { detail } => write!(f, "malformed: {detail}"),
            DeadLetterReason::MissingLaunch { memecoin_address } => {
                write!(f, "no launch known for {memecoin_address}")
            }
        }
    }
}

/// One dead-lettered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub source_id: Option<SourceId>,
    pub transfer_id: Option<TransferId>,
    pub ordering: Option<OrderingKey>,
    pub reason: DeadLetterReason,
    /// The envelope in wire shape.
    pub envelope: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(reason: DeadLetterReason, envelope: serde_json::Value) -> Self {
        Self {
            id: DeadLetterId::new(),
            source_id: None,
            transfer_id: None,
            ordering: None,
            reason,
            envelope,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source_id: SourceId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn with_transfer_id(mut self, transfer_id: Option<TransferId>) -> Self {
        self.transfer_id = transfer_id;
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingKey) -> Self {
        self.ordering = Some(ordering);
        self
    }
}
