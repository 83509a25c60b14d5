//! Message broker seam.
//!
//! This crate provides:
//! - The [`Broker`] trait: confirmed publish, topic subscription and explicit
//!   acknowledgment
//! - [`Delivery`] values handed to consumers
//! - [`PostgresBroker`], durable queues in a PostgreSQL table that survive
//!   restarts
//! - [`InMemoryBroker`], process-local queues for tests and single-process
//!   deployments without a database

pub mod broker;
pub mod delivery;
pub mod error;
pub mod memory;
pub mod postgres;

pub use broker::{Broker, DeliveryStream};
pub use delivery::{Delivery, DeliveryTag, PublishedMessage};
pub use error::{BrokerError, Result};
pub use memory::{InMemoryBroker, PUBLISHED_LOG_CAPACITY};
pub use postgres::PostgresBroker;
