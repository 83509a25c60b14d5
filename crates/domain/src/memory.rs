use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId};
use outbox::{InMemoryOutbox, NewOutboxEvent};
use tokio::sync::Mutex;

use crate::error::{DomainError, Result};
use crate::store::{Committed, WriteStore};
use crate::{CreateOrder, CreateProduct, IntegrationEvent, Money, Order, Product};

#[derive(Debug, Default)]
struct WriteState {
    products: Vec<Product>,
    orders: Vec<Order>,
    next_product_id: i64,
    next_order_id: i64,
    unavailable: bool,
    fail_next_write: bool,
}

impl WriteState {
    fn begin(&mut self) -> Result<()> {
        if self.unavailable {
            return Err(DomainError::Unavailable("write store is offline".to_string()));
        }
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(DomainError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

/// In-memory write store for testing and single-process runs.
///
/// The state lock is held from the domain insert until the outbox append
/// returns, and the domain rows are only committed after the append
/// succeeded, so readers never see one without the other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWriteStore {
    state: Arc<Mutex<WriteState>>,
    outbox: InMemoryOutbox,
}

impl InMemoryWriteStore {
    /// Creates a store with its own empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store appending to an existing outbox.
    pub fn with_outbox(outbox: InMemoryOutbox) -> Self {
        Self {
            state: Arc::default(),
            outbox,
        }
    }

    /// The outbox this store appends to.
    pub fn outbox(&self) -> &InMemoryOutbox {
        &self.outbox
    }

    /// Makes the next write fail before any row is inserted.
    pub async fn fail_next_write(&self) {
        self.state.lock().await.fail_next_write = true;
    }

    /// Takes the store offline (or back online).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Number of stored products.
    pub async fn product_count(&self) -> usize {
        self.state.lock().await.products.len()
    }
}

#[async_trait]
impl WriteStore for InMemoryWriteStore {
    async fn insert_product(&self, product: CreateProduct) -> Result<Committed<Product>> {
        let mut state = self.state.lock().await;
        state.begin()?;

        let id = ProductId::new(state.next_product_id + 1);
        let product = product.into_product(id, Utc::now());
        let event = IntegrationEvent::product_created(&product);
        let stored = self
            .outbox
            .append(NewOutboxEvent::serialize(event.topic(), &event)?)
            .await?;

        state.next_product_id = id.as_i64();
        state.products.push(product.clone());

        Ok(Committed {
            record: product,
            event,
            outbox_id: stored.id,
        })
    }

    async fn insert_order(&self, order: CreateOrder, total: Money) -> Result<Committed<Order>> {
        let mut state = self.state.lock().await;
        state.begin()?;

        let id = OrderId::new(state.next_order_id + 1);
        let order = order.into_order(id, total, Utc::now());
        let event = IntegrationEvent::order_created(&order);
        let stored = self
            .outbox
            .append(NewOutboxEvent::serialize(event.topic(), &event)?)
            .await?;

        state.next_order_id = id.as_i64();
        state.orders.push(order.clone());

        Ok(Committed {
            record: order,
            event,
            outbox_id: stored.id,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(DomainError::Unavailable("write store is offline".to_string()));
        }
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(DomainError::Unavailable("write store is offline".to_string()));
        }
        Ok(state.orders.clone())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(DomainError::Unavailable("write store is offline".to_string()));
        }
        Ok(state.products.clone())
    }
}
