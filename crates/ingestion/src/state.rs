//! Ingestion pipeline state machine.

use serde::{Deserialize, Serialize};

/// The state of a pipeline in its lifecycle.
///
/// State transitions:
/// ```text
/// Idle ──► Streaming ──┬──► Draining ──► Stopped
///            ▲         ├──► Stopped
///            │         ▼
///            └──── Backoff ──► Draining / Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PipelineState {
    /// Created, not yet running.
    #[default]
    Idle,

    /// Pulling and applying batches.
    Streaming,

    /// Waiting before retrying after a transient failure.
    Backoff,

    /// Stop requested or feed exhausted; finishing the in-flight batch.
    Draining,

    /// No more work will be done (terminal state).
    Stopped,
}

impl PipelineState {
    /// Returns true if the pipeline can move to `next`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Streaming)
                | (Idle, Stopped)
                | (Streaming, Backoff)
                | (Streaming, Draining)
                | (Streaming, Stopped)
                | (Backoff, Streaming)
                | (Backoff, Draining)
                | (Backoff, Stopped)
                | (Draining, Stopped)
        )
    }

    /// Returns true if batches are being pulled.
    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Streaming | PipelineState::Backoff)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Stopped)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Streaming => "Streaming",
            PipelineState::Backoff => "Backoff",
            PipelineState::Draining => "Draining",
            PipelineState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
