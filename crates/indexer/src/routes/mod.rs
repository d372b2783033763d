pub mod cursors;
pub mod dead_letters;
pub mod health;
pub mod launches;
pub mod metrics;
pub mod transactions;
