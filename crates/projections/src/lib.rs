//! Projection of launchpad events onto launch and transaction records.
//!
//! This crate provides:
//! - [`Projector`] trait: a pure function from prior launch state and one
//!   event to the writes to perform
//! - Three projectors: [`LaunchCreatedProjector`], [`LiquidityAddedProjector`],
//!   [`TransferProjector`]
//! - [`IdempotencyGuard`] backed by the transaction record primary key
//! - [`ProjectionProcessor`] running guard and projector inside one unit of work

pub mod error;
pub mod guard;
pub mod processor;
pub mod projection;
pub mod projectors;

pub use error::{ProjectionError, Result};
pub use guard::IdempotencyGuard;
pub use processor::ProjectionProcessor;
pub use projection::{
    LaunchLookup, LaunchMutation, ProjectionOutcome, ProjectionResult, Projector,
    transaction_record_for,
};
pub use projectors::{LaunchCreatedProjector, LiquidityAddedProjector, TransferProjector};
