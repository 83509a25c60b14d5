use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::IntegrationEvent;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{ApplyOutcome, ReadModelStore};
use crate::views::{CatalogEntry, DeadLetter, OrderSummary, ProductSales};
use crate::{ProjectionError, Result};

#[derive(Debug, Default)]
struct ReadState {
    processed: HashSet<Uuid>,
    orders: HashMap<OrderId, OrderSummary>,
    sales: HashMap<ProductId, ProductSales>,
    catalog: HashMap<ProductId, CatalogEntry>,
    watermark: Option<DateTime<Utc>>,
    dead_letters: Vec<DeadLetter>,
    unavailable: bool,
    fail_next_apply: bool,
    reject_next_apply: bool,
}

impl ReadState {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(ProjectionError::Unavailable(
                "read model store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_views(&mut self, event: &IntegrationEvent) {
        match event {
            IntegrationEvent::OrderCreated(e) => {
                if self.orders.contains_key(&e.order_id) {
                    return;
                }
                self.orders.insert(e.order_id, OrderSummary::from_event(e));
                for delta in ProductSales::deltas(e) {
                    self.sales
                        .entry(delta.product_id)
                        .or_insert_with(|| ProductSales::empty(delta.product_id))
                        .accumulate(&delta);
                }
            }
            IntegrationEvent::ProductCreated(e) => {
                self.catalog
                    .entry(e.product_id)
                    .or_insert_with(|| CatalogEntry::from_event(e));
            }
        }
    }
}

/// In-memory read models for testing and single-process runs.
///
/// Every apply runs under one write lock, which makes the dedup check, the
/// view updates and the watermark advance a single atomic step.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReadModels {
    state: Arc<RwLock<ReadState>>,
}

impl InMemoryReadModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next apply fail before anything changes.
    pub async fn fail_next_apply(&self) {
        self.state.write().await.fail_next_apply = true;
    }

    /// Makes the next apply refuse its event, as a database constraint would.
    pub async fn reject_next_apply(&self) {
        self.state.write().await.reject_next_apply = true;
    }

    /// Takes the store offline (or back online).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Number of distinct events applied.
    pub async fn processed_count(&self) -> usize {
        self.state.read().await.processed.len()
    }

    /// Number of rows in the order view.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl ReadModelStore for InMemoryReadModels {
    async fn apply(&self, event: &IntegrationEvent) -> Result<ApplyOutcome> {
        let mut state = self.state.write().await;
        state.check_available()?;
        if state.fail_next_apply {
            state.fail_next_apply = false;
            return Err(ProjectionError::Unavailable(
                "injected apply failure".to_string(),
            ));
        }
        if state.reject_next_apply {
            state.reject_next_apply = false;
            return Err(ProjectionError::Rejected(
                "injected constraint violation".to_string(),
            ));
        }

        if !state.processed.insert(event.event_id()) {
            return Ok(ApplyOutcome::Duplicate);
        }

        state.apply_views(event);
        let timestamp = event.timestamp();
        state.watermark = Some(state.watermark.map_or(timestamp, |w| w.max(timestamp)));

        Ok(ApplyOutcome::Applied)
    }

    async fn park_dead_letter(&self, topic: &str, payload: &str, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let id = state.dead_letters.len() as i64 + 1;
        state.dead_letters.push(DeadLetter {
            id,
            topic: topic.to_string(),
            payload: payload.to_string(),
            reason: reason.to_string(),
            received_at: Utc::now(),
        });
        Ok(())
    }

    async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.watermark)
    }

    async fn order(&self, id: OrderId) -> Result<Option<OrderSummary>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn product_sales(&self, id: ProductId) -> Result<Option<ProductSales>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.sales.get(&id).cloned())
    }

    async fn catalog_entry(&self, id: ProductId) -> Result<Option<CatalogEntry>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.catalog.get(&id).cloned())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.dead_letters.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use common::CustomerId;
    use domain::{Money, OrderCreated, OrderItem, ProductCreated};

    use super::*;

    fn order_created(order_id: i64, at: DateTime<Utc>) -> IntegrationEvent {
        IntegrationEvent::OrderCreated(OrderCreated {
            event_id: Uuid::new_v4(),
            order_id: OrderId::new(order_id),
            customer_id: CustomerId::new(1),
            total: Money::from_cents(2500),
            items: vec![
                OrderItem::new(ProductId::new(1), 2, Money::from_cents(1000)),
                OrderItem::new(ProductId::new(2), 1, Money::from_cents(500)),
            ],
            timestamp: at,
        })
    }

    #[tokio::test]
    async fn same_event_twice_counts_once() {
        let store = InMemoryReadModels::new();
        let event = order_created(1, Utc::now());

        assert_eq!(store.apply(&event).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(store.apply(&event).await.unwrap(), ApplyOutcome::Duplicate);

        let sales = store.product_sales(ProductId::new(1)).await.unwrap().unwrap();
        assert_eq!(sales.total_quantity_sold, 2);
        assert_eq!(sales.order_count, 1);
        assert_eq!(store.processed_count().await, 1);
    }

    #[tokio::test]
    async fn distinct_orders_accumulate_sales() {
        let store = InMemoryReadModels::new();
        store.apply(&order_created(1, Utc::now())).await.unwrap();
        store.apply(&order_created(2, Utc::now())).await.unwrap();

        let sales = store.product_sales(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(sales.total_quantity_sold, 2);
        assert_eq!(sales.total_revenue, Money::from_cents(1000));
        assert_eq!(sales.order_count, 2);
    }

    #[tokio::test]
    async fn watermark_never_moves_back() {
        let store = InMemoryReadModels::new();
        let t1 = Utc::now() - TimeDelta::seconds(60);
        let t2 = Utc::now();

        store.apply(&order_created(2, t2)).await.unwrap();
        store.apply(&order_created(1, t1)).await.unwrap();

        assert_eq!(store.watermark().await.unwrap(), Some(t2));
        assert_eq!(store.order_count().await, 2);
    }

    #[tokio::test]
    async fn failed_apply_changes_nothing() {
        let store = InMemoryReadModels::new();
        let event = order_created(1, Utc::now());
        store.fail_next_apply().await;

        assert!(store.apply(&event).await.is_err());
        assert!(store.order(OrderId::new(1)).await.unwrap().is_none());
        assert!(store.watermark().await.unwrap().is_none());

        assert_eq!(store.apply(&event).await.unwrap(), ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn product_created_fills_catalog_once() {
        let store = InMemoryReadModels::new();
        let created = |name: &str| {
            IntegrationEvent::ProductCreated(ProductCreated {
                event_id: Uuid::new_v4(),
                product_id: ProductId::new(5),
                name: name.to_string(),
                category: "tools".to_string(),
                price: Money::from_cents(999),
                stock: 3,
                timestamp: Utc::now(),
            })
        };

        store.apply(&created("Hammer")).await.unwrap();
        store.apply(&created("Renamed")).await.unwrap();

        let entry = store.catalog_entry(ProductId::new(5)).await.unwrap().unwrap();
        assert_eq!(entry.name, "Hammer");
    }
}
