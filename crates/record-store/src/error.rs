use thiserror::Error;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write hit an existing primary or unique key.
    ///
    /// For transaction records this is the idempotency signal: the event was
    /// already applied.
    #[error("Unique violation on {entity}: {key}")]
    UniqueViolation { entity: &'static str, key: String },

    /// The store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row does not map back to a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }

    /// Returns true if the same operation may succeed when retried.
    ///
    /// A unique violation at commit means a concurrent unit won; on retry
    /// the idempotency guard sees its mark.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::UniqueViolation { .. } | StoreError::Unavailable(_) => true,
            StoreError::Database(err) => is_transient_sqlx(err),
            StoreError::Corrupt(_) | StoreError::Migration(_) | StoreError::Serialization(_) => {
                false
            }
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // serialization_failure, deadlock_detected, admin/crash shutdown
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("40001" | "40P01" | "57P01" | "57P02" | "57P03")
        ),
        _ => false,
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
