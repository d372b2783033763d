use events::{EventEnvelope, EventKind, EventPayload};
use record_store::TokenLaunchRecord;

use crate::projection::{LaunchLookup, ProjectionResult, Projector, transaction_record_for};
use crate::{ProjectionError, Result};

/// Records a buy or sell. Never touches the launch record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferProjector;

impl Projector for TransferProjector {
    fn name(&self) -> &'static str {
        "TransferProjector"
    }

    fn kind(&self) -> EventKind {
        EventKind::Transfer
    }

    fn lookup(&self, _envelope: &EventEnvelope) -> LaunchLookup {
        LaunchLookup::None
    }

    fn project(
        &self,
        _prior: Option<&TokenLaunchRecord>,
        envelope: &EventEnvelope,
    ) -> Result<ProjectionResult> {
        match envelope.payload() {
            EventPayload::Transfer(_) => Ok(ProjectionResult::applied(
                None,
                transaction_record_for(envelope),
            )),
            _ => Err(ProjectionError::KindMismatch {
                projector: self.name(),
                kind: envelope.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProjectionOutcome;
    use events::{MemecoinAddress, Transfer, TransferSide};
    use record_store::TransactionKind;

    #[test]
    fn inserts_transaction_even_without_launch() {
        let envelope = EventEnvelope::builder()
            .transfer_id("0xbeef_2")
            .block(9)
            .payload(EventPayload::Transfer(Transfer {
                memecoin_address: MemecoinAddress::new("0xunknown"),
                owner_address: "0xbuyer".to_string(),
                side: TransferSide::Buy,
                amount: "100".to_string(),
                quote_amount: None,
            }))
            .build()
            .unwrap();

        let result = TransferProjector.project(None, &envelope).unwrap();
        assert_eq!(result.outcome, ProjectionOutcome::Applied);
        assert!(result.launch_mutation.is_none());

        let record = result.transaction_to_insert.unwrap();
        assert_eq!(record.kind, TransactionKind::Buy);
        assert_eq!(record.memecoin_address.as_str(), "0xunknown");
    }
}
