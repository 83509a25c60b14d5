//! Write side of the outbox sync system.
//!
//! This crate provides:
//! - Products, orders and [`Money`]
//! - The [`IntegrationEvent`] model published through the outbox
//! - The Outbox Writer: [`WriteStore`] implementations that commit domain
//!   rows and the describing outbox event atomically
//! - [`CommandService`], which validates requests before writing

pub mod error;
pub mod events;
pub mod memory;
pub mod money;
pub mod order;
pub mod postgres;
pub mod product;
pub mod service;
pub mod store;

pub use error::{DomainError, Result, ValidationError};
pub use events::{
    DecodeError, IntegrationEvent, ORDER_EVENTS_TOPIC, OrderCreated, PRODUCT_EVENTS_TOPIC,
    ProductCreated,
};
pub use memory::InMemoryWriteStore;
pub use money::Money;
pub use order::{CreateOrder, Order, OrderItem};
pub use postgres::PostgresWriteStore;
pub use product::{CreateProduct, Product};
pub use service::CommandService;
pub use store::{Committed, WriteStore};
