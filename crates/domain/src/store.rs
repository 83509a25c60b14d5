//! Write-side storage: domain rows and their outbox event in one transaction.

use async_trait::async_trait;
use common::OrderId;
use outbox::OutboxId;

use crate::error::Result;
use crate::{CreateOrder, CreateProduct, IntegrationEvent, Money, Order, Product};

/// Outcome of a committed write: the stored record and the event that was
/// appended to the outbox alongside it.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub record: T,
    pub event: IntegrationEvent,
    pub outbox_id: OutboxId,
}

/// Storage for the write side.
///
/// Every mutating method inserts the domain rows and the describing outbox
/// event in a single atomic unit: after it returns `Ok` both are visible;
/// after it returns `Err` neither is.
#[async_trait]
pub trait WriteStore: Send + Sync {
    /// Inserts a validated product and its `ProductCreated` event.
    async fn insert_product(&self, product: CreateProduct) -> Result<Committed<Product>>;

    /// Inserts a validated order with its computed total and its
    /// `OrderCreated` event.
    async fn insert_order(&self, order: CreateOrder, total: Money) -> Result<Committed<Order>>;

    /// Loads one order.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// All orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// All products, oldest first.
    async fn list_products(&self) -> Result<Vec<Product>>;
}
