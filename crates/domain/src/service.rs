//! Command service: validation in front of the transactional write.

use common::OrderId;

use crate::error::Result;
use crate::store::{Committed, WriteStore};
use crate::{CreateOrder, CreateProduct, Order, Product};

/// Entry point for state-changing requests.
///
/// Validates the command, then hands it to the [`WriteStore`] which commits
/// the domain rows and the outbox event together. Callers only ever see the
/// success or failure of their own transaction.
#[derive(Clone)]
pub struct CommandService<S: WriteStore> {
    store: S,
}

impl<S: WriteStore> CommandService<S> {
    /// Creates a new command service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a product.
    #[tracing::instrument(skip(self, cmd), fields(name = %cmd.name))]
    pub async fn create_product(&self, cmd: CreateProduct) -> Result<Committed<Product>> {
        cmd.validate()?;

        let committed = self.store.insert_product(cmd).await?;

        metrics::counter!("outbox_events_written_total", "event_type" => "ProductCreated")
            .increment(1);
        tracing::info!(
            product_id = %committed.record.id,
            outbox_id = %committed.outbox_id,
            "product created"
        );
        Ok(committed)
    }

    /// Creates an order; the total is computed here from the line items.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Committed<Order>> {
        let total = cmd.validate()?;

        let committed = self.store.insert_order(cmd, total).await?;

        metrics::counter!("outbox_events_written_total", "event_type" => "OrderCreated")
            .increment(1);
        tracing::info!(
            order_id = %committed.record.id,
            outbox_id = %committed.outbox_id,
            total = %committed.record.total,
            "order created"
        );
        Ok(committed)
    }

    /// Loads an order from the write side.
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.store.get_order(id).await
    }

    /// Lists orders from the write side.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        self.store.list_orders().await
    }

    /// Lists products from the write side.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.store.list_products().await
    }
}
