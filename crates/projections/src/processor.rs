//! Runs guard and projector for one event inside a unit of work.

use events::{EventEnvelope, EventKind};
use record_store::{TokenLaunchRecord, UnitOfWork};

use crate::guard::IdempotencyGuard;
use crate::projection::{LaunchLookup, LaunchMutation, ProjectionResult, Projector};
use crate::projectors::{LaunchCreatedProjector, LiquidityAddedProjector, TransferProjector};
use crate::{ProjectionError, Result};

/// Dispatches events to the projector registered for their kind.
///
/// The processor:
/// - Checks the idempotency guard before projecting
/// - Loads the prior launch state the projector asks for
/// - Writes the applied mark first, then the launch mutation
///
/// Everything happens in the caller's unit of work; committing is the
/// caller's job. When the returned outcome is `SkippedDuplicate` because the
/// mark already existed, nothing has been staged.
pub struct ProjectionProcessor {
    projectors: Vec<Box<dyn Projector>>,
    guard: IdempotencyGuard,
}

impl ProjectionProcessor {
    /// Creates a processor with no projectors.
    pub fn new() -> Self {
        Self {
            projectors: Vec::new(),
            guard: IdempotencyGuard::new(),
        }
    }

    /// Creates a processor with the launch, liquidity and transfer projectors.
    pub fn with_default_projectors() -> Self {
        let mut processor = Self::new();
        processor.register(Box::new(LaunchCreatedProjector));
        processor.register(Box::new(LiquidityAddedProjector));
        processor.register(Box::new(TransferProjector));
        processor
    }

    /// Registers a projector, replacing any previous one for the same kind.
    pub fn register(&mut self, projector: Box<dyn Projector>) {
        self.projectors.retain(|p| p.kind() != projector.kind());
        self.projectors.push(projector);
    }

    /// Returns the number of registered projectors.
    pub fn projector_count(&self) -> usize {
        self.projectors.len()
    }

    /// Returns the projector for `kind`, if one is registered.
    pub fn projector_for(&self, kind: EventKind) -> Option<&dyn Projector> {
        self.projectors
            .iter()
            .find(|p| p.kind() == kind)
            .map(|p| p.as_ref())
    }

    /// Projects one event into `uow`.
    #[tracing::instrument(
        skip(self, uow, envelope),
        fields(transfer_id = %envelope.transfer_id(), kind = %envelope.kind())
    )]
    pub async fn process(
        &self,
        uow: &mut dyn UnitOfWork,
        envelope: &EventEnvelope,
    ) -> Result<ProjectionResult> {
        let projector = self
            .projector_for(envelope.kind())
            .ok_or(ProjectionError::NoProjector(envelope.kind()))?;

        if self
            .guard
            .has_been_applied(uow, envelope.transfer_id())
            .await?
        {
            tracing::debug!("already applied");
            return Ok(record(projector, ProjectionResult::skipped_duplicate()));
        }

        let prior = load_prior(uow, projector.lookup(envelope)).await?;
        let result = projector.project(prior.as_ref(), envelope)?;

        // The mark goes first so that a lost race leaves nothing staged.
        if !self
            .guard
            .mark_applied(uow, envelope, result.transaction_to_insert.clone())
            .await?
        {
            return Ok(record(projector, ProjectionResult::skipped_duplicate()));
        }

        match &result.launch_mutation {
            Some(LaunchMutation::Create(record)) => uow.insert_launch(record).await?,
            Some(LaunchMutation::Patch {
                transaction_hash,
                patch,
            }) => {
                uow.patch_launch(transaction_hash, patch).await?;
            }
            None => {}
        }

        Ok(record(projector, result))
    }
}

/// Counts every processed event once, duplicates included.
fn record(projector: &dyn Projector, result: ProjectionResult) -> ProjectionResult {
    metrics::counter!(
        "projections_events_processed",
        "projector" => projector.name(),
        "outcome" => result.outcome.as_str()
    )
    .increment(1);
    result
}

impl Default for ProjectionProcessor {
    fn default() -> Self {
        Self::with_default_projectors()
    }
}

async fn load_prior(
    uow: &mut dyn UnitOfWork,
    lookup: LaunchLookup,
) -> Result<Option<TokenLaunchRecord>> {
    Ok(match lookup {
        LaunchLookup::None => None,
        LaunchLookup::ByAddress(address) => uow.find_launch_by_address(&address).await?,
        LaunchLookup::ByTxHashOrAddress {
            transaction_hash,
            memecoin_address,
        } => match uow.find_launch_by_tx_hash(&transaction_hash).await? {
            Some(record) => Some(record),
            None => uow.find_launch_by_address(&memecoin_address).await?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProjectionOutcome;
    use events::{EventPayload, LaunchCreated, LiquidityAdded, MemecoinAddress, TxHash};
    use record_store::{InMemoryRecordStore, RecordReader, RecordStore};

    fn launch(id: &str, hash: &str, address: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .transfer_id(id)
            .block(1)
            .payload(EventPayload::LaunchCreated(LaunchCreated {
                transaction_hash: TxHash::new(hash),
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
            .payload(EventPayload::LiquidityAdded(LiquidityAdded {
                memecoin_address: MemecoinAddress::new(address),
                quote_token: None,
                amount: None,
            }))
            .build()
            .unwrap()
    }

    async fn run(
        store: &InMemoryRecordStore,
        processor: &ProjectionProcessor,
        envelope: &EventEnvelope,
    ) -> ProjectionOutcome {
        let mut uow = store.begin().await.unwrap();
        let result = processor.process(uow.as_mut(), envelope).await.unwrap();
        uow.commit().await.unwrap();
        result.outcome
    }

    #[test]
    fn default_registers_all_kinds() {
        let processor = ProjectionProcessor::default();
        assert_eq!(processor.projector_count(), 3);
        for kind in [
            EventKind::LaunchCreated,
            EventKind::LiquidityAdded,
            EventKind::Transfer,
        ] {
            assert_eq!(processor.projector_for(kind).map(|p| p.kind()), Some(kind));
        }
    }

    #[test]
    fn register_replaces_same_kind() {
        let mut processor = ProjectionProcessor::with_default_projectors();
        processor.register(Box::new(TransferProjector));
        assert_eq!(processor.projector_count(), 3);
    }

    #[tokio::test]
    async fn missing_projector_is_an_error() {
        let store = InMemoryRecordStore::new();
        let processor = ProjectionProcessor::new();
        let mut uow = store.begin().await.unwrap();
        let err = processor
            .process(uow.as_mut(), &liquidity("t-1", "0xa"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::NoProjector(EventKind::LiquidityAdded)
        ));
    }

    #[tokio::test]
    async fn redelivery_is_duplicate() {
        let store = InMemoryRecordStore::new();
        let processor = ProjectionProcessor::default();
        let event = launch("t-1", "0xt1", "0xa");

        assert_eq!(
            run(&store, &processor, &event).await,
            ProjectionOutcome::Applied
        );
        assert_eq!(
            run(&store, &processor, &event).await,
            ProjectionOutcome::SkippedDuplicate
        );
        assert_eq!(store.launch_count().await, 1);
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn duplicates_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let store = InMemoryRecordStore::new();
        let processor = ProjectionProcessor::default();
        let event = launch("t-1", "0xt1", "0xa");
        for _ in 0..3 {
            run(&store, &processor, &event).await;
        }

        let rendered = handle.render();
        let count = |outcome: &str| {
            rendered
                .lines()
                .find(|line| {
                    line.starts_with("projections_events_processed{")
                        && line.contains(&format!("outcome=\"{outcome}\""))
                })
                .and_then(|line| line.rsplit(' ').next())
                .map(str::to_string)
        };
        assert_eq!(count("applied").as_deref(), Some("1"));
        assert_eq!(count("skipped_duplicate").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn liquidity_patches_launch_in_same_unit() {
        let store = InMemoryRecordStore::new();
        let processor = ProjectionProcessor::default();

        let mut uow = store.begin().await.unwrap();
        let first = processor
            .process(uow.as_mut(), &launch("t-1", "0xt1", "0xa"))
            .await
            .unwrap();
        let second = processor
            .process(uow.as_mut(), &liquidity("t-2", "0xa"))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(first.outcome, ProjectionOutcome::Applied);
        assert_eq!(second.outcome, ProjectionOutcome::Applied);
        let record = store
            .get_launch_by_address(&MemecoinAddress::new("0xa"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_liquidity_added);
        assert_eq!(record.liquidity_added_at_block, Some(2));
    }

    #[tokio::test]
    async fn skipped_events_still_leave_a_mark() {
        let store = InMemoryRecordStore::new();
        let processor = ProjectionProcessor::default();

        assert_eq!(
            run(&store, &processor, &liquidity("t-1", "0xb")).await,
            ProjectionOutcome::SkippedMissingTarget
        );
        assert_eq!(store.launch_count().await, 0);
        assert_eq!(store.transaction_count().await, 1);

        // Redelivered after the launch exists: still a no-op.
        run(&store, &processor, &launch("t-2", "0xt2", "0xb")).await;
        assert_eq!(
            run(&store, &processor, &liquidity("t-1", "0xb")).await,
            ProjectionOutcome::SkippedDuplicate
        );
        let record = store
            .get_launch_by_address(&MemecoinAddress::new("0xb"))
            .await
            .unwrap()
            .unwrap();
        assert!(!record.is_liquidity_added);
    }
}
