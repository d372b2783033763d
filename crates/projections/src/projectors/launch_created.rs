use events::{EventEnvelope, EventKind, EventPayload};
use record_store::TokenLaunchRecord;

use crate::projection::{
    LaunchLookup, LaunchMutation, ProjectionResult, Projector, transaction_record_for,
};
use crate::{ProjectionError, Result};

/// Creates a launch record the first time a memecoin is seen.
///
/// A record under the same transaction hash, or one that already owns the
/// memecoin address, makes the event a duplicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchCreatedProjector;

impl Projector for LaunchCreatedProjector {
    fn name(&self) -> &'static str {
        "LaunchCreatedProjector"
    }

    fn kind(&self) -> EventKind {
        EventKind::LaunchCreated
    }

    fn lookup(&self, envelope: &EventEnvelope) -> LaunchLookup {
        match envelope.payload() {
            EventPayload::LaunchCreated(p) => LaunchLookup::ByTxHashOrAddress {
                transaction_hash: p.transaction_hash.clone(),
                memecoin_address: p.memecoin_address.clone(),
            },
            _ => LaunchLookup::None,
        }
    }

    fn project(
        &self,
        prior: Option<&TokenLaunchRecord>,
        envelope: &EventEnvelope,
    ) -> Result<ProjectionResult> {
        let EventPayload::LaunchCreated(launch) = envelope.payload() else {
            return Err(ProjectionError::KindMismatch {
                projector: self.name(),
                kind: envelope.kind(),
            });
        };

        if let Some(existing) = prior {
            if existing.transaction_hash != launch.transaction_hash {
                tracing::warn!(
                    memecoin_address = %launch.memecoin_address,
                    existing_hash = %existing.transaction_hash,
                    incoming_hash = %launch.transaction_hash,
                    "memecoin already launched under another transaction"
                );
            }
            return Ok(ProjectionResult::skipped_duplicate());
        }

        let record = TokenLaunchRecord {
            transaction_hash: launch.transaction_hash.clone(),
            memecoin_address: launch.memecoin_address.clone(),
            owner_address: launch.owner_address.clone(),
            quote_token: launch.quote_token.clone(),
            total_supply: launch.total_supply.clone(),
            is_liquidity_added: false,
            created_at_block: envelope.source_block(),
            liquidity_added_at_block: None,
        };

        Ok(ProjectionResult::applied(
            Some(LaunchMutation::Create(record)),
            transaction_record_for(envelope),
        ))
    }
}
