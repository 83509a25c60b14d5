//! Order records and the command that creates them.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::error::ValidationError;

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price at the time of ordering.
    pub price: Money,
}

impl OrderItem {
    pub fn new(product_id: ProductId, quantity: i32, price: Money) -> Self {
        Self {
            product_id,
            quantity,
            price,
        }
    }

    /// `quantity × price`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_mul(i64::from(self.quantity))
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if !self.product_id.is_valid() {
            return Err(ValidationError::InvalidId {
                field: "productId",
                value: self.product_id.as_i64(),
            });
        }
        if self.quantity <= 0 {
            return Err(ValidationError::InvalidQuantity {
                product_id: self.product_id,
                quantity: self.quantity,
            });
        }
        if self.price.is_negative() {
            return Err(ValidationError::NegativePrice { price: self.price });
        }
        Ok(())
    }
}

/// Sums the line totals of `items`.
pub fn items_total(items: &[OrderItem]) -> Result<Money, ValidationError> {
    items.iter().try_fold(Money::zero(), |acc, item| {
        item.line_total()
            .and_then(|line| acc.checked_add(line))
            .ok_or(ValidationError::Overflow { what: "order total" })
    })
}

/// An order as stored on the write side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

/// Command to create an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
}

impl CreateOrder {
    pub fn new(customer_id: CustomerId, items: Vec<OrderItem>) -> Self {
        Self { customer_id, items }
    }

    /// Checks the command and returns the order total.
    pub fn validate(&self) -> Result<Money, ValidationError> {
        if !self.customer_id.is_valid() {
            return Err(ValidationError::InvalidId {
                field: "customerId",
                value: self.customer_id.as_i64(),
            });
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        for item in &self.items {
            item.validate()?;
        }
        items_total(&self.items)
    }

    /// Builds the stored record once the store has assigned an id.
    pub fn into_order(self, id: OrderId, total: Money, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            customer_id: self.customer_id,
            items: self.items,
            total,
            created_at,
        }
    }
}
