//! Ingestion error types.

use std::time::Duration;

use events::{MalformedEvent, OrderingKey};
use projections::ProjectionError;
use record_store::{SourceId, StoreError};
use thiserror::Error;

use crate::feed::FeedError;

/// Errors raised while applying one event or one batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The envelope can never be projected. Dead-lettered, never retried.
    #[error(transparent)]
    Malformed(#[from] MalformedEvent),

    /// The record store failed. Retried when the store error is transient.
    #[error("Storage error: {0}")]
    TransientStorage(#[from] StoreError),

    /// A unit of work ran past its deadline and was rolled back.
    #[error("Unit of work timed out after {after:?}")]
    Timeout { after: Duration },

    /// The inbound feed failed.
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// The projection layer rejected the event.
    #[error("Projection error: {0}")]
    Projection(ProjectionError),

    /// An envelope could not be converted back to its wire shape.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    /// Returns true if retrying the same work may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::TransientStorage(err) => err.is_transient(),
            IngestError::Timeout { .. } => true,
            IngestError::Feed(err) => err.is_transient(),
            IngestError::Malformed(_)
            | IngestError::Projection(_)
            | IngestError::Serialization(_) => false,
        }
    }
}

impl From<ProjectionError> for IngestError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Store(e) => IngestError::TransientStorage(e),
            other => IngestError::Projection(other),
        }
    }
}

/// Errors that stop a source for good.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An ordering key did not increase within the source.
    #[error("Ordering violation on {source_id}: {current} arrived after {previous}")]
    OrderingViolation {
        source_id: SourceId,
        previous: OrderingKey,
        current: OrderingKey,
        last_committed: Option<OrderingKey>,
    },

    /// A failure that retrying cannot fix.
    #[error("Permanent failure on {source_id}: {error}")]
    Permanent {
        source_id: SourceId,
        #[source]
        error: IngestError,
        last_committed: Option<OrderingKey>,
    },

    /// Transient failures outlasted the retry budget.
    #[error("Retry budget exhausted on {source_id} after {attempts} attempts: {last_error}")]
    RetryBudgetExhausted {
        source_id: SourceId,
        attempts: u32,
        #[source]
        last_error: IngestError,
        last_committed: Option<OrderingKey>,
    },
}

impl PipelineError {
    pub fn source_id(&self) -> &SourceId {
        match self {
            PipelineError::OrderingViolation { source_id, .. } => source_id,
            PipelineError::Permanent { source_id, .. } => source_id,
            PipelineError::RetryBudgetExhausted { source_id, .. } => source_id,
        }
    }

    /// The cursor position that was durable when the source stopped.
    pub fn last_committed(&self) -> Option<OrderingKey> {
        match self {
            PipelineError::OrderingViolation { last_committed, .. } => *last_committed,
            PipelineError::Permanent { last_committed, .. } => *last_committed,
            PipelineError::RetryBudgetExhausted { last_committed, .. } => *last_committed,
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use events::{EventKind, MalformedReason};

    #[test]
    fn unavailable_and_timeouts_are_transient() {
        let storage: IngestError = StoreError::Unavailable("down".to_string()).into();
        assert!(storage.is_transient());

        let timeout = IngestError::Timeout {
            after: Duration::from_millis(10),
        };
        assert!(timeout.is_transient());

        let feed: IngestError = FeedError::Unavailable("reconnecting".to_string()).into();
        assert!(feed.is_transient());
    }

    #[test]
    fn permanent_failures_are_not_transient() {
        let malformed: IngestError =
            MalformedEvent::new(None, MalformedReason::EmptyTransferId).into();
        let corrupt: IngestError = StoreError::Corrupt("bad row".to_string()).into();
        let no_projector: IngestError = ProjectionError::NoProjector(EventKind::Transfer).into();
        let decode: IngestError = FeedError::Decode {
            line: 1,
            source: serde_json::from_str::<serde_json::Value>("not json").unwrap_err(),
        }
        .into();

        for err in [malformed, corrupt, no_projector, decode] {
            assert!(!err.is_transient(), "{err}");
        }
    }

    #[test]
    fn projection_store_errors_become_transient_storage() {
        let err: IngestError = ProjectionError::Store(StoreError::Unavailable("x".into())).into();
        assert!(matches!(err, IngestError::TransientStorage(_)));

        let err: IngestError = ProjectionError::NoProjector(EventKind::Transfer).into();
        assert!(matches!(err, IngestError::Projection(_)));
    }

    #[test]
    fn pipeline_error_reports_last_committed() {
        let err = PipelineError::OrderingViolation {
            source_id: SourceId::new("launchpad"),
            previous: OrderingKey::new(10, 0, 0),
            current: OrderingKey::new(9, 0, 0),
            last_committed: Some(OrderingKey::new(8, 1, 1)),
        };
        assert_eq!(err.last_committed(), Some(OrderingKey::new(8, 1, 1)));
        assert_eq!(err.source_id().as_str(), "launchpad");
        assert_eq!(
            err.to_string(),
            "Ordering violation on launchpad: 9:0:0 arrived after 10:0:0"
        );
    }
}
