use thiserror::Error;

use crate::OutboxId;

/// Errors that can occur when interacting with the outbox relation.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The requested outbox row does not exist.
    #[error("Outbox event not found: {0}")]
    NotFound(OutboxId),

    /// The store could not be reached. Transient; callers retry.
    #[error("Outbox store unavailable: {0}")]
    Unavailable(String),

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

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
