//! Read-model records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use domain::{Money, OrderCreated, ProductCreated};
use serde::Serialize;
use uuid::Uuid;

/// One row of `orders_read`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub total: Money,
    pub item_count: i32,
    pub created_at: DateTime<Utc>,
    /// Event that created the row.
    pub event_id: Uuid,
}

impl OrderSummary {
    pub fn from_event(event: &OrderCreated) -> Self {
        Self {
            order_id: event.order_id,
            customer_id: event.customer_id,
            total: event.total,
            item_count: i32::try_from(event.items.len()).unwrap_or(i32::MAX),
            created_at: event.timestamp,
            event_id: event.event_id,
        }
    }
}

/// One row of `product_sales_view`: sales accumulated over all orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub product_id: ProductId,
    pub total_quantity_sold: i64,
    pub total_revenue: Money,
    pub order_count: i64,
}

impl ProductSales {
    /// All-zero sales, reported for products nobody ordered yet.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            total_quantity_sold: 0,
            total_revenue: Money::zero(),
            order_count: 0,
        }
    }

    /// Adds `delta` into this row.
    pub fn accumulate(&mut self, delta: &ProductSales) {
        self.total_quantity_sold += delta.total_quantity_sold;
        self.total_revenue = Money::from_cents(
            self.total_revenue
                .cents()
                .saturating_add(delta.total_revenue.cents()),
        );
        self.order_count += delta.order_count;
    }

    /// Per-product contribution of one order, ordered by product id.
    ///
    /// A product appearing on several lines of the same order counts as one
    /// order.
    pub fn deltas(event: &OrderCreated) -> Vec<ProductSales> {
        let mut by_product: BTreeMap<ProductId, ProductSales> = BTreeMap::new();
        for item in &event.items {
            let entry = by_product.entry(item.product_id).or_insert(ProductSales {
                order_count: 1,
                ..ProductSales::empty(item.product_id)
            });
            entry.total_quantity_sold += i64::from(item.quantity);
            let line = item.line_total().unwrap_or(Money::zero());
            entry.total_revenue = Money::from_cents(
                entry.total_revenue.cents().saturating_add(line.cents()),
            );
        }
        by_product.into_values().collect()
    }
}

/// One row of `product_catalog_read`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn from_event(event: &ProductCreated) -> Self {
        Self {
            product_id: event.product_id,
            name: event.name.clone(),
            category: event.category.clone(),
            price: event.price,
            stock: event.stock,
            created_at: event.timestamp,
        }
    }
}

/// A parked message that could not be decoded or validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: i64,
    pub topic: String,
    pub payload: String,
    pub reason: String,
    pub received_at: DateTime<Utc>,
}
