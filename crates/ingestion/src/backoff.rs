//! Bounded exponential backoff.

use std::time::Duration;

/// Retry schedule for transient failures.
///
/// The delay before retry `attempt` (zero-based) is `initial * 2^attempt`,
/// capped at `ceiling`. After `max_retries` retries the source stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub ceiling: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, ceiling: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            ceiling,
            max_retries,
        }
    }

    /// Delay before retry number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.ceiling)
            .min(self.ceiling)
    }

    /// Returns true if retry number `attempt` is still within budget.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            ceiling: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}
