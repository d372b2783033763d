//! Canonical model of one on-chain launchpad event.
//!
//! An [`EventEnvelope`] always holds a validated payload; there is no way to
//! build one that would fail [`MalformedEvent`] checks. Feeds deliver the
//! looser [`RawEnvelope`] wire shape, which is decoded at the pipeline edge.

pub mod envelope;
pub mod error;
pub mod payload;
pub mod raw;

pub use common::{MemecoinAddress, SourceId, TransferId, TxHash};
pub use envelope::{EventEnvelope, EventEnvelopeBuilder, EventKind, OrderingKey};
pub use error::{MalformedEvent, MalformedReason};
pub use payload::{EventPayload, LaunchCreated, LiquidityAdded, Transfer, TransferSide};
pub use raw::RawEnvelope;
