use thiserror::Error;

use crate::DeliveryTag;

/// Errors that can occur when talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached or refused the operation.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker did not confirm a published message.
    #[error("Publish to {topic} was not confirmed: {reason}")]
    PublishRejected { topic: String, reason: String },

    /// Ack or nack for a delivery the broker no longer tracks.
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(DeliveryTag),

    /// The queue database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Running migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The broker has been shut down.
    #[error("Broker closed")]
    Closed,
}

impl BrokerError {
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Unavailable(_)
                | BrokerError::PublishRejected { .. }
                | BrokerError::Database(_)
        )
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
