//! Store-backed "already applied" check.

use events::EventEnvelope;
use record_store::{StoreError, TokenTransactionRecord, TransferId, UnitOfWork};

use crate::Result;
use crate::projection::transaction_record_for;

/// Decides whether an event has already been applied.
///
/// The mark is the transaction record keyed by the transfer ID, written in the
/// same unit of work as the projection. There is no in-memory seen set; a
/// unique-key conflict on insert is the "already applied" answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdempotencyGuard;

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Returns true if a transaction record exists for `transfer_id`.
    pub async fn has_been_applied(
        &self,
        uow: &mut dyn UnitOfWork,
        transfer_id: &TransferId,
    ) -> Result<bool> {
        Ok(uow.find_transaction(transfer_id).await?.is_some())
    }

    /// Writes the applied mark inside `uow`.
    ///
    /// Uses `record` when given, otherwise the default record for the
    /// envelope. Returns false, with nothing staged, if the mark already
    /// exists.
    pub async fn mark_applied(
        &self,
        uow: &mut dyn UnitOfWork,
        envelope: &EventEnvelope,
        record: Option<TokenTransactionRecord>,
    ) -> Result<bool> {
        let record = record.unwrap_or_else(|| transaction_record_for(envelope));
        match uow.insert_transaction(&record).await {
            Ok(()) => Ok(true),
            Err(StoreError::UniqueViolation { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{EventPayload, LiquidityAdded, MemecoinAddress};
    use record_store::{InMemoryRecordStore, RecordReader, RecordStore, TransactionKind};

    fn envelope(id: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .transfer_id(id)
            .block(3)
            .payload(EventPayload::LiquidityAdded(LiquidityAdded {
                memecoin_address: MemecoinAddress::new("0xa"),
                quote_token: None,
                amount: Some("10".to_string()),
            }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn mark_then_check_across_units() {
        let store = InMemoryRecordStore::new();
        let guard = IdempotencyGuard::new();
        let event = envelope("t-1");

        let mut uow = store.begin().await.unwrap();
        assert!(
            !guard
                .has_been_applied(uow.as_mut(), event.transfer_id())
                .await
                .unwrap()
        );
        assert!(guard.mark_applied(uow.as_mut(), &event, None).await.unwrap());
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(
            guard
                .has_been_applied(uow.as_mut(), event.transfer_id())
                .await
                .unwrap()
        );
        assert!(!guard.mark_applied(uow.as_mut(), &event, None).await.unwrap());

        let stored = store
            .get_transaction(event.transfer_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.kind, TransactionKind::LiquidityAdded);
    }

    #[tokio::test]
    async fn second_mark_in_same_unit_is_rejected() {
        let store = InMemoryRecordStore::new();
        let guard = IdempotencyGuard::new();
        let event = envelope("t-2");

        let mut uow = store.begin().await.unwrap();
        assert!(guard.mark_applied(uow.as_mut(), &event, None).await.unwrap());
        assert!(!guard.mark_applied(uow.as_mut(), &event, None).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(store.transaction_count().await, 1);
    }
}
