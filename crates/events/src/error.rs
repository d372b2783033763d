use thiserror::Error;

use crate::{EventKind, TransferId};

/// Why an envelope failed construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    /// The idempotency key is empty.
    #[error("transfer id is empty")]
    EmptyTransferId,

    /// The event kind is not one this indexer understands.
    #[error("unrecognized event kind '{0}'")]
    UnknownKind(String),

    /// A required builder field was never set.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// The payload does not have the shape its kind requires.
    #[error("invalid {kind} payload: {detail}")]
    InvalidPayload { kind: EventKind, detail: String },
}

/// An event that can never be projected. Dead-lettered, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed event (transfer id {}): {reason}", display_id(.transfer_id))]
pub struct MalformedEvent {
    /// The transfer ID, when one was present.
    pub transfer_id: Option<TransferId>,
    pub reason: MalformedReason,
}

impl MalformedEvent {
    pub fn new(transfer_id: Option<TransferId>, reason: MalformedReason) -> Self {
        Self {
            transfer_id,
            reason,
        }
    }

    pub(crate) fn payload(
        transfer_id: &TransferId,
        kind: EventKind,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(
            Some(transfer_id.clone()),
            MalformedReason::InvalidPayload {
                kind,
                detail: detail.into(),
            },
        )
    }
}

fn display_id(id: &Option<TransferId>) -> &str {
    match id {
        Some(id) if !id.is_blank() => id.as_str(),
        _ => "<none>",
    }
}
