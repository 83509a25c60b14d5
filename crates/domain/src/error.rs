//! Domain error types.

use common::ProductId;
use outbox::OutboxError;
use thiserror::Error;

use crate::Money;

/// A request or event that breaks a domain rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// An order must contain at least one item.
    #[error("Order has no items")]
    NoItems,

    /// Quantities must be positive.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// Prices must not be negative.
    #[error("Invalid price {price} (must not be negative)")]
    NegativePrice { price: Money },

    /// Stock must not be negative.
    #[error("Invalid stock {stock} (must not be negative)")]
    NegativeStock { stock: i32 },

    /// A required identifier is missing or not positive.
    #[error("Invalid {field}: {value}")]
    InvalidId { field: &'static str, value: i64 },

    /// A required text field is empty.
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// Text fields are stored as SQL text, which cannot hold NUL.
    #[error("{field} must not contain NUL characters")]
    NulCharacter { field: &'static str },

    /// An amount does not fit in the money range.
    #[error("Amount overflow while computing {what}")]
    Overflow { what: &'static str },

    /// An event's total disagrees with its line items.
    #[error("Total {actual} does not match item sum {expected}")]
    TotalMismatch { expected: Money, actual: Money },
}

/// Errors that can occur during write-side operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request was rejected before any write.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Appending to the outbox failed; the transaction was rolled back.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// A database error occurred; the transaction was rolled back.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The write store could not be reached.
    #[error("Write store unavailable: {0}")]
    Unavailable(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for write-side operations.
pub type Result<T> = std::result::Result<T, DomainError>;
