//! Top-level ingestion driver.
//!
//! The pipeline pulls batches from one feed, checks ordering, fans the batch
//! out to the coordinator by address, and advances the cursor once the whole
//! batch has committed. Transient failures back off and retry the same batch.

use std::collections::HashMap;
use std::sync::Arc;

use events::{EventEnvelope, MemecoinAddress, OrderingKey, RawEnvelope, SourceId};
use futures_util::StreamExt;
use projections::ProjectionOutcome;
use record_store::{DeadLetterEntry, DeadLetterReason, RecordStore};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::PipelineConfig;
use crate::coordinator::ConsistencyCoordinator;
use crate::error::{IngestError, PipelineError};
use crate::feed::EventFeed;
use crate::state::PipelineState;

/// Outcome counts for one batch, or for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub applied: u64,
    pub skipped_duplicate: u64,
    pub skipped_missing_target: u64,
    pub dead_lettered: u64,
}

impl BatchReport {
    pub fn record(&mut self, outcome: ProjectionOutcome) {
        match outcome {
            ProjectionOutcome::Applied => self.applied += 1,
            ProjectionOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            ProjectionOutcome::SkippedMissingTarget => self.skipped_missing_target += 1,
        }
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.applied += other.applied;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_missing_target += other.skipped_missing_target;
        self.dead_lettered += other.dead_lettered;
    }

    /// Envelopes accounted for, whatever their outcome.
    pub fn total(&self) -> u64 {
        self.applied + self.skipped_duplicate + self.skipped_missing_target + self.dead_lettered
    }
}

/// Summary returned when a pipeline stops cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub source_id: SourceId,
    /// Durable cursor position at stop time.
    pub last_committed: Option<OrderingKey>,
    /// Batches committed during this run.
    pub batches: u64,
    pub totals: BatchReport,
}

/// Control handle for a running pipeline.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<PipelineState>,
}

impl PipelineHandle {
    /// Asks the pipeline to stop after the in-flight batch.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_rx.clone()
    }
}

/// Drives one source from its feed into the record store.
pub struct IngestionPipeline<S: RecordStore, F: EventFeed> {
    coordinator: Arc<ConsistencyCoordinator<S>>,
    feed: F,
    config: PipelineConfig,
    stop_tx: Arc<watch::Sender<bool>>,
    state_tx: watch::Sender<PipelineState>,
}

impl<S: RecordStore, F: EventFeed> IngestionPipeline<S, F> {
    pub fn new(store: S, feed: F, config: PipelineConfig) -> Self {
        let coordinator = ConsistencyCoordinator::new(store)
            .with_unit_timeout(config.unit_timeout)
            .with_source(feed.source_id().clone());
        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        Self {
            coordinator: Arc::new(coordinator),
            feed,
            config,
            stop_tx: Arc::new(stop_tx),
            state_tx,
        }
    }

    /// Uses a shared coordinator, e.g. one serving several sources.
    pub fn with_coordinator(mut self, coordinator: Arc<ConsistencyCoordinator<S>>) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn coordinator(&self) -> &Arc<ConsistencyCoordinator<S>> {
        &self.coordinator
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            stop_tx: Arc::clone(&self.stop_tx),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Runs until the feed is exhausted, a stop is requested, or the source
    /// fails for good.
    #[tracing::instrument(skip(self), fields(source_id = %self.feed.source_id()))]
    pub async fn run(self) -> Result<StopReport, PipelineError> {
        let Self {
            coordinator,
            mut feed,
            config,
            stop_tx,
            state_tx,
        } = self;
        let source_id = feed.source_id().clone();
        let mut stop_rx = stop_tx.subscribe();
        let mut driver = Driver {
            source_id: source_id.clone(),
            config,
            state_tx,
            committed: None,
            attempt: 0,
        };

        driver.transition(PipelineState::Streaming);

        // Stored cursor, read under the same retry policy as batches.
        loop {
            match coordinator.read_cursor(&source_id).await {
                Ok(cursor) => {
                    driver.committed = cursor.map(|c| c.position);
                    driver.attempt = 0;
                    break;
                }
                Err(err) => {
                    if driver.back_off(err, &mut stop_rx).await? == Wake::Stop {
                        return Ok(driver.finish(0, BatchReport::default()));
                    }
                }
            }
        }

        // Replays at or below the watermark are dropped. A fresh source
        // starts just before the configured block.
        let mut watermark = driver.committed.or_else(|| {
            driver
                .config
                .starting_block
                .and_then(OrderingKey::before_block)
        });
        tracing::info!(
            last_committed = ?driver.committed,
            watermark = ?watermark,
            "pipeline started"
        );

        let mut order = OrderCheck::default();
        let mut pending: Option<PreparedBatch> = None;
        let mut batches = 0u64;
        let mut totals = BatchReport::default();

        loop {
            let mut batch = match pending.take() {
                Some(batch) => batch,
                None => {
                    let stop = *stop_rx.borrow();
                    if stop {
                        break;
                    }
                    // A pull abandoned on stop loses nothing durable: the
                    // cursor still points before it.
                    let pulled = tokio::select! {
                        pulled = feed.next_batch(watermark, driver.config.batch_size) => pulled,
                        _ = stop_requested(&mut stop_rx) => break,
                    };
                    match pulled {
                        Ok(None) => {
                            tracing::info!("feed exhausted");
                            break;
                        }
                        Ok(Some(raws)) if raws.is_empty() => {
                            if wait_or_stop(driver.config.poll_interval, &mut stop_rx).await
                                == Wake::Stop
                            {
                                break;
                            }
                            continue;
                        }
                        Ok(Some(raws)) => {
                            driver.attempt = 0;
                            order.prepare(&driver, raws, watermark)?
                        }
                        Err(err) => {
                            if driver.back_off(err.into(), &mut stop_rx).await? == Wake::Stop {
                                return Ok(driver.finish(batches, totals));
                            }
                            continue;
                        }
                    }
                }
            };

            // A stop seen mid-commit drains: the batch still commits.
            let committed = {
                let commit = commit_batch(&coordinator, &source_id, &mut batch, &driver);
                tokio::pin!(commit);
                tokio::select! {
                    result = &mut commit => result,
                    _ = stop_requested(&mut stop_rx) => {
                        driver.transition(PipelineState::Draining);
                        commit.await
                    }
                }
            };

            match committed {
                Ok(Some(report)) => {
                    driver.attempt = 0;
                    if let Some(position) = batch.checkpoint_at(driver.committed) {
                        driver.committed = Some(position);
                        watermark = Some(position);
                    }
                    batches += 1;
                    totals.merge(&report);
                    metrics::counter!("ingestion_batches_total").increment(1);
                    tracing::info!(
                        applied = report.applied,
                        skipped_duplicate = report.skipped_duplicate,
                        skipped_missing_target = report.skipped_missing_target,
                        dead_lettered = report.dead_lettered,
                        last_committed = ?driver.committed,
                        "batch committed"
                    );
                }
                Ok(None) => driver.attempt = 0,
                Err(err) => {
                    pending = Some(batch);
                    if driver.back_off(err, &mut stop_rx).await? == Wake::Stop {
                        return Ok(driver.finish(batches, totals));
                    }
                }
            }
        }

        Ok(driver.finish(batches, totals))
    }
}

/// Applies every envelope not yet done, then checkpoints.
///
/// Returns `None` when the batch had nothing left to do or record.
async fn commit_batch<S: RecordStore>(
    coordinator: &ConsistencyCoordinator<S>,
    source_id: &SourceId,
    batch: &mut PreparedBatch,
    driver: &Driver,
) -> crate::Result<Option<BatchReport>> {
    let partitions = batch.pending_partitions();
    let envelopes = &batch.envelopes;

    let results: Vec<(Vec<(usize, ProjectionOutcome)>, Option<IngestError>)> =
        futures_util::stream::iter(partitions.into_iter().map(|indices| async move {
            let mut done = Vec::with_capacity(indices.len());
            for index in indices {
                match coordinator.apply(&envelopes[index]).await {
                    Ok(outcome) => done.push((index, outcome)),
                    Err(err) => return (done, Some(err)),
                }
            }
            (done, None)
        }))
        .buffer_unordered(driver.config.max_workers.max(1))
        .collect()
        .await;

    let mut first_error = None;
    for (done, err) in results {
        for (index, outcome) in done {
            batch.done[index] = Some(outcome);
        }
        if first_error.is_none() {
            first_error = err;
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    let Some(position) = batch.checkpoint_at(driver.committed) else {
        return Ok((!batch.envelopes.is_empty()).then(|| batch.report()));
    };
    coordinator
        .checkpoint(source_id, position, &batch.malformed)
        .await?;
    Ok(Some(batch.report()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Retry,
    Stop,
}

/// Mutable run state shared by the loop's steps.
struct Driver {
    source_id: SourceId,
    config: PipelineConfig,
    state_tx: watch::Sender<PipelineState>,
    committed: Option<OrderingKey>,
    attempt: u32,
}

impl Driver {
    fn transition(&self, next: PipelineState) {
        let current = *self.state_tx.borrow();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "ignoring invalid state transition");
            return;
        }
        tracing::debug!(from = %current, to = %next, "pipeline state changed");
        self.state_tx.send_replace(next);
    }

    /// Waits out the next retry delay. Fails the source at once on a
    /// permanent error, or when the budget is spent.
    async fn back_off(
        &mut self,
        err: IngestError,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<Wake, PipelineError> {
        if !err.is_transient() {
            tracing::error!(
                error = %err,
                last_committed = ?self.committed,
                "permanent failure, stopping source"
            );
            self.transition(PipelineState::Stopped);
            return Err(PipelineError::Permanent {
                source_id: self.source_id.clone(),
                error: err,
                last_committed: self.committed,
            });
        }

        let policy = self.config.backoff;
        if !policy.allows_retry(self.attempt) {
            tracing::error!(
                attempts = self.attempt + 1,
                error = %err,
                last_committed = ?self.committed,
                "retry budget exhausted, stopping source"
            );
            self.transition(PipelineState::Stopped);
            return Err(PipelineError::RetryBudgetExhausted {
                source_id: self.source_id.clone(),
                attempts: self.attempt + 1,
                last_error: err,
                last_committed: self.committed,
            });
        }

        if *stop_rx.borrow() {
            tracing::info!(error = %err, "stop requested, not retrying");
            return Ok(Wake::Stop);
        }

        let delay = policy.delay_for(self.attempt);
        self.attempt += 1;
        metrics::counter!("ingestion_retries_total").increment(1);
        tracing::warn!(attempt = self.attempt, delay = ?delay, error = %err, "transient failure, backing off");

        self.transition(PipelineState::Backoff);
        let wake = wait_or_stop(delay, stop_rx).await;
        if wake == Wake::Retry {
            self.transition(PipelineState::Streaming);
        }
        Ok(wake)
    }

    fn finish(self, batches: u64, totals: BatchReport) -> StopReport {
        self.transition(PipelineState::Draining);
        self.transition(PipelineState::Stopped);
        tracing::info!(
            batches,
            total = totals.total(),
            last_committed = ?self.committed,
            "pipeline stopped"
        );
        StopReport {
            source_id: self.source_id,
            last_committed: self.committed,
            batches,
            totals,
        }
    }
}

async fn wait_or_stop(delay: std::time::Duration, stop_rx: &mut watch::Receiver<bool>) -> Wake {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Wake::Retry,
        _ = stop_requested(stop_rx) => Wake::Stop,
    }
}

async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    while !*stop_rx.borrow_and_update() {
        if stop_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Tracks the last accepted key of a source across batches.
#[derive(Debug, Default)]
struct OrderCheck {
    last: Option<(OrderingKey, String)>,
}

impl OrderCheck {
    /// Drops replays, enforces strictly increasing keys, and decodes.
    ///
    /// Nothing is applied before the whole batch passes, so a violation
    /// leaves the store as it was.
    fn prepare(
        &mut self,
        driver: &Driver,
        raws: Vec<RawEnvelope>,
        watermark: Option<OrderingKey>,
    ) -> Result<PreparedBatch, PipelineError> {
        let mut last = self.last.clone();
        let mut batch = PreparedBatch::default();

        for raw in raws {
            let key = raw.ordering_key();
            let mut redelivery = false;
            match &last {
                None => {
                    if watermark.is_some_and(|w| key <= w) {
                        continue;
                    }
                }
                Some((previous, previous_id)) => {
                    if key == *previous && raw.transfer_id == *previous_id {
                        redelivery = true;
                    } else if key <= *previous {
                        tracing::error!(previous = %previous, current = %key, "ordering violation");
                        driver.transition(PipelineState::Stopped);
                        return Err(PipelineError::OrderingViolation {
                            source_id: driver.source_id.clone(),
                            previous: *previous,
                            current: key,
                            last_committed: driver.committed,
                        });
                    }
                }
            }

            match raw.decode() {
                Ok(envelope) => batch.envelopes.push(envelope),
                // Already dead-lettered with its first copy.
                Err(_) if redelivery => {}
                Err(malformed) => {
                    tracing::warn!(error = %malformed, ordering = %key, "dead-lettering malformed envelope");
                    let entry = DeadLetterEntry::new(
                        DeadLetterReason::Malformed {
                            detail: malformed.to_string(),
                        },
                        serde_json::to_value(&raw).unwrap_or_default(),
                    )
                    .with_source(driver.source_id.clone())
                    .with_transfer_id(raw.transfer_id())
                    .with_ordering(key);
                    batch.malformed.push(entry);
                }
            }
            batch.last_key = batch.last_key.max(Some(key));
            last = Some((key, raw.transfer_id));
        }

        self.last = last;
        batch.done = vec![None; batch.envelopes.len()];
        Ok(batch)
    }
}

/// A batch that passed ordering checks, with per-envelope progress so a
/// retry only re-runs what did not finish.
#[derive(Debug, Default)]
struct PreparedBatch {
    envelopes: Vec<EventEnvelope>,
    malformed: Vec<DeadLetterEntry>,
    last_key: Option<OrderingKey>,
    done: Vec<Option<ProjectionOutcome>>,
}

impl PreparedBatch {
    /// Unfinished envelope indices grouped by address, in arrival order.
    fn pending_partitions(&self) -> Vec<Vec<usize>> {
        let mut slots: HashMap<&MemecoinAddress, usize> = HashMap::new();
        let mut partitions: Vec<Vec<usize>> = Vec::new();
        for (index, envelope) in self.envelopes.iter().enumerate() {
            if self.done[index].is_some() {
                continue;
            }
            let slot = *slots
                .entry(envelope.memecoin_address())
                .or_insert_with(|| {
                    partitions.push(Vec::new());
                    partitions.len() - 1
                });
            partitions[slot].push(index);
        }
        partitions
    }

    /// The cursor position to persist, if this batch moves it or carries
    /// dead letters.
    fn checkpoint_at(&self, committed: Option<OrderingKey>) -> Option<OrderingKey> {
        let last = self.last_key?;
        if Some(last) > committed {
            Some(last)
        } else if !self.malformed.is_empty() {
            committed.or(Some(last))
        } else {
            None
        }
    }

    fn report(&self) -> BatchReport {
        let mut report = BatchReport::default();
        for outcome in self.done.iter().flatten() {
            report.record(*outcome);
        }
        report.dead_lettered = self.malformed.len() as u64;
        report
    }
}
