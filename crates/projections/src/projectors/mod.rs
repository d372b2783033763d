//! One projector per event kind.

mod launch_created;
mod liquidity_added;
mod transfer;

pub use launch_created::LaunchCreatedProjector;
pub use liquidity_added::LiquidityAddedProjector;
pub use transfer::TransferProjector;
