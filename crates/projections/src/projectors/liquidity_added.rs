use events::{EventEnvelope, EventKind, EventPayload};
use record_store::{LaunchPatch, TokenLaunchRecord};

use crate::projection::{
    LaunchLookup, LaunchMutation, ProjectionResult, Projector, transaction_record_for,
};
use crate::{ProjectionError, Result};

/// Flips `is_liquidity_added` on the launch owning the memecoin address.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiquidityAddedProjector;

impl Projector for LiquidityAddedProjector {
    fn name(&self) -> &'static str {
        "LiquidityAddedProjector"
    }

    fn kind(&self) -> EventKind {
        EventKind::LiquidityAdded
    }

    fn lookup(&self, envelope: &EventEnvelope) -> LaunchLookup {
        LaunchLookup::ByAddress(envelope.memecoin_address().clone())
    }

    fn project(
        &self,
        prior: Option<&TokenLaunchRecord>,
        envelope: &EventEnvelope,
    ) -> Result<ProjectionResult> {
        if !matches!(envelope.payload(), EventPayload::LiquidityAdded(_)) {
            return Err(ProjectionError::KindMismatch {
                projector: self.name(),
                kind: envelope.kind(),
            });
        }

        let Some(launch) = prior else {
            tracing::warn!(
                transfer_id = %envelope.transfer_id(),
                memecoin_address = %envelope.memecoin_address(),
                "liquidity added for unknown launch"
            );
            return Ok(ProjectionResult::skipped_missing_target());
        };

        if launch.is_liquidity_added {
            return Ok(ProjectionResult::skipped_duplicate());
        }

        Ok(ProjectionResult::applied(
            Some(LaunchMutation::Patch {
                transaction_hash: launch.transaction_hash.clone(),
                patch: LaunchPatch::LiquidityAdded {
                    at_block: envelope.source_block(),
                },
            }),
            transaction_record_for(envelope),
        ))
    }
}
