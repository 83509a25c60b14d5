//! Query side of the outbox sync system.
//!
//! This crate provides:
//! - [`Projector`], which applies broker deliveries to read models exactly
//!   once per event id and acks only after commit
//! - [`ReadModelStore`] with PostgreSQL and in-memory implementations
//! - Read-model records: order summaries, product sales, catalog entries and
//!   dead letters
//! - [`LagReporter`] for read-model staleness

pub mod error;
pub mod lag;
pub mod memory;
pub mod postgres;
pub mod projector;
pub mod store;
pub mod views;

pub use error::{ProjectionError, Result};
pub use lag::{LagReport, LagReporter};
pub use memory::InMemoryReadModels;
pub use postgres::{DEFAULT_PROJECTION_NAME, PostgresReadModels};
pub use projector::{HEALTH_COMPONENT, HandleOutcome, Projector, ProjectorConfig};
pub use store::{ApplyOutcome, ReadModelStore};
pub use views::{CatalogEntry, DeadLetter, OrderSummary, ProductSales};
