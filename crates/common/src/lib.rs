//! Shared identity types for the launchpad indexer.

pub mod types;

pub use types::{MemecoinAddress, SourceId, TransferId, TxHash};
