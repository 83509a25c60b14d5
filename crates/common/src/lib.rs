//! Shared building blocks for the outbox sync system.
//!
//! - Store-assigned integer identifiers ([`ProductId`], [`OrderId`], [`CustomerId`])
//! - [`RetryPolicy`] for bounded, capped exponential backoff
//! - [`HealthRegistry`] through which background components report readiness

pub mod health;
pub mod retry;
pub mod types;

pub use health::{ComponentHealth, HealthRegistry};
pub use retry::RetryPolicy;
pub use types::{CustomerId, OrderId, ProductId};
