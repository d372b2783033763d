//! Ordered, idempotent ingestion of launchpad events.
//!
//! This crate provides:
//! - [`EventFeed`] trait with [`VecFeed`], [`NdjsonFeed`] and [`StreamFeed`]
//! - [`ConsistencyCoordinator`] applying one envelope per unit of work,
//!   serialized per entity through a [`LaneMap`]
//! - [`IngestionPipeline`] pulling batches, enforcing source order, retrying
//!   transient failures with [`BackoffPolicy`], and persisting the cursor
//!
//! Entities never share a lane unless they share a key, so unrelated tokens
//! are applied in parallel.

pub mod backoff;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod lane;
pub mod pipeline;
pub mod state;

pub use backoff::BackoffPolicy;
pub use config::PipelineConfig;
pub use coordinator::ConsistencyCoordinator;
pub use error::{IngestError, PipelineError, Result};
pub use feed::{EventFeed, FeedError, NdjsonFeed, StreamFeed, VecFeed};
pub use lane::{LaneGuard, LaneKey, LaneMap, lane_keys};
pub use pipeline::{BatchReport, IngestionPipeline, PipelineHandle, StopReport};
pub use state::PipelineState;
