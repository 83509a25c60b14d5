//! Outbox relay.
//!
//! Bridges the durable outbox relation to the broker: claims pending events
//! oldest first, publishes each one, and marks it published only after the
//! broker confirmed it. A crash anywhere in between leaves the event pending,
//! so it is published again later (at-least-once).

pub mod config;
pub mod error;
pub mod relay;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use relay::{OutboxRelay, RelayCycleReport};

/// Name under which the relay reports to the health registry.
pub const HEALTH_COMPONENT: &str = "relay";
