//! Consistency coordinator: serialized, atomic application per entity.

use std::time::{Duration, Instant};

use events::{EventEnvelope, OrderingKey};
use projections::{ProjectionOutcome, ProjectionProcessor};
use record_store::{
    Cursor, DeadLetterEntry, DeadLetterReason, RecordStore, SourceId,
};

use crate::Result;
use crate::error::IngestError;
use crate::lane::{LaneMap, lane_keys};

/// Applies envelopes one entity at a time.
///
/// For each envelope the coordinator:
/// 1. Computes the envelope's lane keys and acquires them (sorted)
/// 2. Runs guard and projector in one unit of work, under a deadline
/// 3. Records a dead letter if the target launch is missing
/// 4. Commits, then releases the lanes
///
/// Envelopes on different entities run in parallel; envelopes on the same
/// entity queue on its lane in arrival order.
pub struct ConsistencyCoordinator<S: RecordStore> {
    store: S,
    processor: ProjectionProcessor,
    lanes: LaneMap,
    unit_timeout: Duration,
    source_id: Option<SourceId>,
}

impl<S: RecordStore> ConsistencyCoordinator<S> {
    /// Creates a coordinator with the default projectors and a 5s deadline.
    pub fn new(store: S) -> Self {
        Self {
            store,
            processor: ProjectionProcessor::with_default_projectors(),
            lanes: LaneMap::new(),
            unit_timeout: Duration::from_secs(5),
            source_id: None,
        }
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Tags dead letters written by this coordinator with `source_id`.
    pub fn with_source(mut self, source_id: SourceId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn with_processor(mut self, processor: ProjectionProcessor) -> Self {
        self.processor = processor;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lanes(&self) -> &LaneMap {
        &self.lanes
    }

    /// Applies one envelope.
    ///
    /// A timed-out unit is rolled back and reported as
    /// [`IngestError::Timeout`]; the caller may retry it.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            transfer_id = %envelope.transfer_id(),
            memecoin_address = %envelope.memecoin_address(),
            kind = %envelope.kind(),
            outcome = tracing::field::Empty,
        )
    )]
    pub async fn apply(&self, envelope: &EventEnvelope) -> Result<ProjectionOutcome> {
        let _lanes = self.lanes.acquire(lane_keys(envelope)).await;

        let started = Instant::now();
        let result = tokio::time::timeout(self.unit_timeout, self.apply_in_unit(envelope)).await;
        metrics::histogram!("ingestion_unit_of_work_seconds")
            .record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::warn!(timeout = ?self.unit_timeout, "unit of work timed out");
                return Err(IngestError::Timeout {
                    after: self.unit_timeout,
                });
            }
        };

        tracing::Span::current().record("outcome", outcome.as_str());
        metrics::counter!("ingestion_events_total", "outcome" => outcome.as_str()).increment(1);
        Ok(outcome)
    }

    async fn apply_in_unit(&self, envelope: &EventEnvelope) -> Result<ProjectionOutcome> {
        // Dropping the unit on any early return rolls it back.
        let mut uow = self.store.begin().await?;
        let result = self.processor.process(uow.as_mut(), envelope).await?;

        if result.outcome == ProjectionOutcome::SkippedMissingTarget {
            let entry = self
                .dead_letter(
                    DeadLetterReason::MissingLaunch {
                        memecoin_address: envelope.memecoin_address().clone(),
                    },
                    serde_json::to_value(envelope.to_raw()?)?,
                )
                .with_transfer_id(Some(envelope.transfer_id().clone()))
                .with_ordering(envelope.ordering_key());
            uow.append_dead_letter(&entry).await?;
            metrics::counter!("ingestion_dead_letters_total", "reason" => "missing_launch")
                .increment(1);
        }

        uow.commit().await?;
        Ok(result.outcome)
    }

    /// Durably records batch progress: dead letters for malformed envelopes
    /// and the new cursor, in one unit of work.
    #[tracing::instrument(skip(self, malformed), fields(dead_letters = malformed.len()))]
    pub async fn checkpoint(
        &self,
        source_id: &SourceId,
        position: OrderingKey,
        malformed: &[DeadLetterEntry],
    ) -> Result<()> {
        let mut uow = self.store.begin().await?;
        for entry in malformed {
            uow.append_dead_letter(entry).await?;
        }
        uow.write_cursor(&Cursor::new(source_id.clone(), position))
            .await?;

        tokio::time::timeout(self.unit_timeout, uow.commit())
            .await
            .map_err(|_| IngestError::Timeout {
                after: self.unit_timeout,
            })??;

        if !malformed.is_empty() {
            metrics::counter!("ingestion_dead_letters_total", "reason" => "malformed")
                .increment(malformed.len() as u64);
        }
        Ok(())
    }

    /// Reads the stored cursor for `source_id`.
    pub async fn read_cursor(&self, source_id: &SourceId) -> Result<Option<Cursor>> {
        Ok(self.store.read_cursor(source_id).await?)
    }

    fn dead_letter(&self, reason: DeadLetterReason, envelope: serde_json::Value) -> DeadLetterEntry {
        let entry = DeadLetterEntry::new(reason, envelope);
        match &self.source_id {
            Some(source_id) => entry.with_source(source_id.clone()),
            None => entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{EventPayload, LaunchCreated, LiquidityAdded, MemecoinAddress, TxHash};
    use record_store::{InMemoryRecordStore, RecordReader};

    fn launch(id: &str, address: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .transfer_id(id)
            .block(1)
            .payload(EventPayload::LaunchCreated(LaunchCreated {
                transaction_hash: TxHash::new(format!("0x{id}")),
                memecoin_address: MemecoinAddress::new(address),
                owner_address: "0xowner".to_string(),
                quote_token: None,
                total_supply: "1000".to_string(),
            }))
            .build()
            .unwrap()
    }

    fn liquidity(id: &str, address: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .transfer_id(id)
            .block(2)
            .tx_index(4)
            .payload(EventPayload::LiquidityAdded(LiquidityAdded {
                memecoin_address: MemecoinAddress::new(address),
                quote_token: None,
                amount: None,
            }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn applies_and_deduplicates() {
        let store = InMemoryRecordStore::new();
        let coordinator = ConsistencyCoordinator::new(store.clone());

        let event = launch("t-1", "0xa");
        assert_eq!(
            coordinator.apply(&event).await.unwrap(),
            ProjectionOutcome::Applied
        );
        assert_eq!(
            coordinator.apply(&event).await.unwrap(),
            ProjectionOutcome::SkippedDuplicate
        );
        assert_eq!(store.launch_count().await, 1);
        assert_eq!(coordinator.lanes().active(), 0);
    }

    #[tokio::test]
    async fn missing_target_is_dead_lettered_with_mark() {
        let store = InMemoryRecordStore::new();
        let coordinator = ConsistencyCoordinator::new(store.clone())
            .with_source(SourceId::new("launchpad"));

        let event = liquidity("t-1", "0xb");
        assert_eq!(
            coordinator.apply(&event).await.unwrap(),
            ProjectionOutcome::SkippedMissingTarget
        );
        // Redelivery is a duplicate and does not add a second dead letter.
        assert_eq!(
            coordinator.apply(&event).await.unwrap(),
            ProjectionOutcome::SkippedDuplicate
        );

        let letters = store.dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(
            letters[0].reason,
            DeadLetterReason::MissingLaunch {
                memecoin_address: MemecoinAddress::new("0xb")
            }
        );
        assert_eq!(letters[0].source_id, Some(SourceId::new("launchpad")));
        assert_eq!(letters[0].ordering, Some(OrderingKey::new(2, 4, 0)));
        assert_eq!(letters[0].envelope["event_kind"], "LiquidityAdded");
    }

    #[tokio::test]
    async fn store_failure_is_transient_and_rolled_back() {
        let store = InMemoryRecordStore::new();
        let coordinator = ConsistencyCoordinator::new(store.clone());
        store.fail_next_commits(1);

        let event = launch("t-1", "0xa");
        let err = coordinator.apply(&event).await.unwrap_err();
        assert!(matches!(err, IngestError::TransientStorage(_)));
        assert!(err.is_transient());
        assert_eq!(store.transaction_count().await, 0);

        assert_eq!(
            coordinator.apply(&event).await.unwrap(),
            ProjectionOutcome::Applied
        );
    }

    #[tokio::test]
    async fn slow_unit_times_out_without_effect() {
        let store = InMemoryRecordStore::new();
        store.set_commit_latency(Duration::from_millis(200));
        let coordinator =
            ConsistencyCoordinator::new(store.clone()).with_unit_timeout(Duration::from_millis(20));

        let err = coordinator.apply(&launch("t-1", "0xa")).await.unwrap_err();
        assert!(matches!(err, IngestError::Timeout { .. }));
        assert_eq!(store.launch_count().await, 0);
        assert_eq!(coordinator.lanes().active(), 0);
    }

    #[tokio::test]
    async fn checkpoint_writes_cursor_and_dead_letters_together() {
        let store = InMemoryRecordStore::new();
        let coordinator = ConsistencyCoordinator::new(store.clone());
        let source = SourceId::new("launchpad");
        let entry = DeadLetterEntry::new(
            DeadLetterReason::Malformed {
                detail: "bad".to_string(),
            },
            serde_json::json!({}),
        );

        store.fail_next_commits(1);
        assert!(
            coordinator
                .checkpoint(&source, OrderingKey::new(5, 0, 0), std::slice::from_ref(&entry))
                .await
                .is_err()
        );
        assert!(store.dead_letters(10).await.unwrap().is_empty());
        assert!(coordinator.read_cursor(&source).await.unwrap().is_none());

        coordinator
            .checkpoint(&source, OrderingKey::new(5, 0, 0), &[entry])
            .await
            .unwrap();
        assert_eq!(store.dead_letters(10).await.unwrap().len(), 1);
        assert_eq!(
            coordinator
                .read_cursor(&source)
                .await
                .unwrap()
                .map(|c| c.position),
            Some(OrderingKey::new(5, 0, 0))
        );
    }
}
