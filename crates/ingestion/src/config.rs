//! Pipeline tuning knobs.

use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Configuration for one ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum envelopes pulled per batch.
    pub batch_size: usize,

    /// Maximum address partitions applied concurrently.
    pub max_workers: usize,

    /// Deadline for one unit of work.
    pub unit_timeout: Duration,

    /// How long to wait when the feed has nothing new.
    pub poll_interval: Duration,

    /// Retry schedule for transient failures.
    pub backoff: BackoffPolicy,

    /// First block to ingest when the source has no stored cursor.
    pub starting_block: Option<u64>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn starting_block(mut self, block: u64) -> Self {
        self.starting_block = Some(block);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_workers: 8,
            unit_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
            starting_block: None,
        }
    }
}
