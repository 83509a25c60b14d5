//! Projection error types.

use thiserror::Error;

/// Errors that can occur while projecting events.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The read-model database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Running migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The broker failed to ack, nack or subscribe.
    #[error("Broker error: {0}")]
    Broker(#[from] broker::BrokerError),

    /// The read-model store is unreachable.
    #[error("Read model store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the event's content. Retrying cannot succeed.
    #[error("Event rejected by the read model store: {0}")]
    Rejected(String),
}

impl ProjectionError {
    /// Returns true when the same event will fail the same way on every
    /// retry: data exceptions (SQLSTATE class 22) and integrity constraint
    /// violations (class 23).
    pub fn is_permanent(&self) -> bool {
        match self {
            ProjectionError::Rejected(_) => true,
            ProjectionError::Database(sqlx::Error::Database(db)) => db
                .code()
                .is_some_and(|code| code.starts_with("22") || code.starts_with("23")),
            _ => false,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
