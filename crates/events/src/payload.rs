//! Kind-specific event payloads and their shape validation.

use serde::{Deserialize, Serialize};

use crate::{EventKind, MemecoinAddress, TxHash};

/// A memecoin was deployed through the launchpad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCreated {
    pub transaction_hash: TxHash,
    pub memecoin_address: MemecoinAddress,
    pub owner_address: String,
    #[serde(default)]
    pub quote_token: Option<String>,
    /// Total supply as an unsigned decimal string.
    pub total_supply: String,
}

/// Liquidity was added to a launched memecoin's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityAdded {
    pub memecoin_address: MemecoinAddress,
    #[serde(default)]
    pub quote_token: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

/// Direction of a token transfer relative to the launchpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferSide {
    Buy,
    Sell,
}

impl TransferSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferSide::Buy => "buy",
            TransferSide::Sell => "sell",
        }
    }
}

/// Tokens moved between a holder and the launchpad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub memecoin_address: MemecoinAddress,
    pub owner_address: String,
    pub side: TransferSide,
    pub amount: String,
    #[serde(default)]
    pub quote_amount: Option<String>,
}

/// The payload of an envelope, one variant per event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    LaunchCreated(LaunchCreated),
    LiquidityAdded(LiquidityAdded),
    Transfer(Transfer),
}

impl EventPayload {
    /// Returns the kind of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::LaunchCreated(_) => EventKind::LaunchCreated,
            EventPayload::LiquidityAdded(_) => EventKind::LiquidityAdded,
            EventPayload::Transfer(_) => EventKind::Transfer,
        }
    }

    /// The memecoin every payload kind refers to.
    pub fn memecoin_address(&self) -> &MemecoinAddress {
        match self {
            EventPayload::LaunchCreated(p) => &p.memecoin_address,
            EventPayload::LiquidityAdded(p) => &p.memecoin_address,
            EventPayload::Transfer(p) => &p.memecoin_address,
        }
    }

    /// Checks the kind-specific shape rules, returning a description of the
    /// first violation.
    pub fn validate(&self) -> Result<(), String> {
        require_address(self.memecoin_address())?;
        match self {
            EventPayload::LaunchCreated(p) => {
                if p.transaction_hash.is_blank() {
                    return Err("transaction_hash is empty".to_string());
                }
                require_text("owner_address", &p.owner_address)?;
                require_amount("total_supply", &p.total_supply)
            }
            EventPayload::LiquidityAdded(p) => match &p.amount {
                Some(amount) => require_amount("amount", amount),
                None => Ok(()),
            },
            EventPayload::Transfer(p) => {
                require_text("owner_address", &p.owner_address)?;
                require_amount("amount", &p.amount)?;
                match &p.quote_amount {
                    Some(quote) => require_amount("quote_amount", quote),
                    None => Ok(()),
                }
            }
        }
    }

    /// Serializes the inner payload without the kind tag.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EventPayload::LaunchCreated(p) => serde_json::to_value(p),
            EventPayload::LiquidityAdded(p) => serde_json::to_value(p),
            EventPayload::Transfer(p) => serde_json::to_value(p),
        }
    }

    /// Deserializes an untagged payload for the given kind.
    pub fn from_json(kind: EventKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::LaunchCreated => EventPayload::LaunchCreated(serde_json::from_value(value)?),
            EventKind::LiquidityAdded => {
                EventPayload::LiquidityAdded(serde_json::from_value(value)?)
            }
            EventKind::Transfer => EventPayload::Transfer(serde_json::from_value(value)?),
        })
    }
}

fn require_address(address: &MemecoinAddress) -> Result<(), String> {
    if address.is_blank() {
        Err("memecoin_address is empty".to_string())
    } else {
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is empty"))
    } else {
        Ok(())
    }
}

// Token amounts are u256 on chain, so they travel as decimal strings.
fn require_amount(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        Err(format!("{field} must be an unsigned decimal, got '{value}'"))
    } else {
        Ok(())
    }
}
