//! Projection error types.

use events::EventKind;
use record_store::StoreError;
use thiserror::Error;

/// Errors that can occur while projecting an event.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the record store.
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// No projector is registered for this event kind.
    #[error("No projector registered for {0}")]
    NoProjector(EventKind),

    /// A projector was handed an event of another kind.
    #[error("{projector} cannot project {kind} events")]
    KindMismatch {
        projector: &'static str,
        kind: EventKind,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
