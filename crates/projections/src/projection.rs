//! Core projector trait and projection results.

use events::{EventEnvelope, EventKind, EventPayload, TransferSide};
use record_store::{
    LaunchPatch, MemecoinAddress, TokenLaunchRecord, TokenTransactionRecord, TransactionKind,
    TxHash,
};
use serde::Serialize;

use crate::Result;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionOutcome {
    /// The event changed the store.
    Applied,
    /// The event references a launch that does not exist. Marked seen, never retried.
    SkippedMissingTarget,
    /// The event was already applied, or its effect is already present.
    SkippedDuplicate,
}

impl ProjectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionOutcome::Applied => "applied",
            ProjectionOutcome::SkippedMissingTarget => "skipped_missing_target",
            ProjectionOutcome::SkippedDuplicate => "skipped_duplicate",
        }
    }
}

impl std::fmt::Display for ProjectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write to a launch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMutation {
    Create(TokenLaunchRecord),
    Patch {
        transaction_hash: TxHash,
        patch: LaunchPatch,
    },
}

/// The writes a projector wants, plus the outcome to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionResult {
    pub launch_mutation: Option<LaunchMutation>,
    pub transaction_to_insert: Option<TokenTransactionRecord>,
    pub outcome: ProjectionOutcome,
}

impl ProjectionResult {
    pub fn applied(
        launch_mutation: Option<LaunchMutation>,
        transaction: TokenTransactionRecord,
    ) -> Self {
        Self {
            launch_mutation,
            transaction_to_insert: Some(transaction),
            outcome: ProjectionOutcome::Applied,
        }
    }

    pub fn skipped_duplicate() -> Self {
        Self {
            launch_mutation: None,
            transaction_to_insert: None,
            outcome: ProjectionOutcome::SkippedDuplicate,
        }
    }

    pub fn skipped_missing_target() -> Self {
        Self {
            launch_mutation: None,
            transaction_to_insert: None,
            outcome: ProjectionOutcome::SkippedMissingTarget,
        }
    }
}

/// Which launch record a projector needs to see before projecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchLookup {
    None,
    ByAddress(MemecoinAddress),
    /// The record under this hash, else whichever record owns the address.
    ByTxHashOrAddress {
        transaction_hash: TxHash,
        memecoin_address: MemecoinAddress,
    },
}

/// Turns the prior launch state and one event into the writes to perform.
///
/// Projectors are pure: they never touch the store. Loading the prior state
/// and performing the writes is the caller's job.
pub trait Projector: Send + Sync {
    /// Returns the name of this projector.
    fn name(&self) -> &'static str;

    /// The event kind this projector handles.
    fn kind(&self) -> EventKind;

    /// The prior state this projector needs for `envelope`.
    fn lookup(&self, envelope: &EventEnvelope) -> LaunchLookup;

    /// Computes the projection.
    fn project(
        &self,
        prior: Option<&TokenLaunchRecord>,
        envelope: &EventEnvelope,
    ) -> Result<ProjectionResult>;
}

/// The transaction record an applied event leaves behind.
///
/// Every kind gets one; its primary key is what makes redelivery a no-op.
pub fn transaction_record_for(envelope: &EventEnvelope) -> TokenTransactionRecord {
    let (kind, owner_address, amount, quote_amount) = match envelope.payload() {
        EventPayload::LaunchCreated(p) => (
            TransactionKind::Launch,
            Some(p.owner_address.clone()),
            p.total_supply.clone(),
            None,
        ),
        EventPayload::LiquidityAdded(p) => (
            TransactionKind::LiquidityAdded,
            None,
            p.amount.clone().unwrap_or_else(|| "0".to_string()),
            None,
        ),
        EventPayload::Transfer(p) => (
            match p.side {
                TransferSide::Buy => TransactionKind::Buy,
                TransferSide::Sell => TransactionKind::Sell,
            },
            Some(p.owner_address.clone()),
            p.amount.clone(),
            p.quote_amount.clone(),
        ),
    };

    TokenTransactionRecord {
        transfer_id: envelope.transfer_id().clone(),
        memecoin_address: envelope.memecoin_address().clone(),
        kind,
        owner_address,
        amount,
        quote_amount,
        created_at_block: envelope.source_block(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{LiquidityAdded, Transfer};

    #[test]
    fn outcome_names() {
        assert_eq!(ProjectionOutcome::Applied.to_string(), "applied");
        assert_eq!(
            ProjectionOutcome::SkippedMissingTarget.as_str(),
            "skipped_missing_target"
        );
        assert_eq!(
            serde_json::to_value(ProjectionOutcome::SkippedDuplicate).unwrap(),
            serde_json::json!("skipped_duplicate")
        );
    }

    #[test]
    fn transfer_record_keeps_side_and_amounts() {
        let envelope = EventEnvelope::builder()
            .transfer_id("t-9")
            .block(77)
            .payload(EventPayload::Transfer(Transfer {
                memecoin_address: MemecoinAddress::new("0xa"),
                owner_address: "0xseller".to_string(),
                side: TransferSide::Sell,
                amount: "12".to_string(),
                quote_amount: Some("3".to_string()),
            }))
            .build()
            .unwrap();

        let record = transaction_record_for(&envelope);
        assert_eq!(record.kind, TransactionKind::Sell);
        assert_eq!(record.amount, "12");
        assert_eq!(record.quote_amount.as_deref(), Some("3"));
        assert_eq!(record.created_at_block, 77);
        assert_eq!(record.transfer_id.as_str(), "t-9");
    }

    #[test]
    fn liquidity_record_defaults_amount() {
        let envelope = EventEnvelope::builder()
            .transfer_id("t-1")
            .payload(EventPayload::LiquidityAdded(LiquidityAdded {
                memecoin_address: MemecoinAddress::new("0xa"),
                quote_token: None,
                amount: None,
            }))
            .build()
            .unwrap();

        let record = transaction_record_for(&envelope);
        assert_eq!(record.kind, TransactionKind::LiquidityAdded);
        assert_eq!(record.amount, "0");
        assert_eq!(record.owner_address, None);
    }
}
