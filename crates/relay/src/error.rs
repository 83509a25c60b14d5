use broker::BrokerError;
use outbox::{OutboxError, OutboxId};
use thiserror::Error;

/// Errors that end a relay cycle early.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Claiming or marking failed. Claimed rows stay pending.
    #[error("Outbox store error: {0}")]
    Store(#[from] OutboxError),

    /// The broker did not confirm an event; it and the rest of the batch
    /// stay pending.
    #[error("Broker unavailable while publishing outbox event {id}: {source}")]
    BrokerUnavailable {
        id: OutboxId,
        #[source]
        source: BrokerError,
    },

    /// A stored payload could not be encoded for the wire.
    #[error("Cannot encode outbox event {id}: {source}")]
    Encode {
        id: OutboxId,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
