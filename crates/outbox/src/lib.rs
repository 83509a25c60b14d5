//! The durable outbox relation.
//!
//! Events are appended in the same transaction as the domain mutation they
//! describe and stay "pending" (`published_at` unset) until a relay has
//! published them and received a broker acknowledgment.
//!
//! - [`OutboxStore`] is the relay-facing contract: claim, mark, release
//! - [`PostgresOutbox`] backs it with the `outbox` table
//! - [`InMemoryOutbox`] backs it in memory for tests and single-process runs

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{OutboxError, Result};
pub use event::{NewOutboxEvent, OutboxEvent, OutboxId};
pub use memory::InMemoryOutbox;
pub use postgres::PostgresOutbox;
pub use store::OutboxStore;
