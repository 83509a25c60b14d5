//! Integration events published through the outbox.
//!
//! Events carry the full state consumers need (event-carried state
//! transfer), so projectors never query the write side. The wire format is a
//! camelCase JSON object tagged by `eventType`; unknown extra fields are
//! ignored so producers can add fields without breaking older consumers.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::order::items_total;
use crate::product::check_text;
use crate::{Money, Order, OrderItem, Product};

/// Topic carrying order events.
pub const ORDER_EVENTS_TOPIC: &str = "order-events";

/// Topic carrying product events.
pub const PRODUCT_EVENTS_TOPIC: &str = "product-events";

/// Every event type this build understands.
pub const KNOWN_EVENT_TYPES: &[&str] = &["OrderCreated", "ProductCreated"];

/// Events the write side emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum IntegrationEvent {
    OrderCreated(OrderCreated),
    ProductCreated(ProductCreated),
}

/// An order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    /// Unique per event; consumers deduplicate on it.
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub timestamp: DateTime<Utc>,
}

/// A product was added to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreated {
    /// Unique per event; consumers deduplicate on it.
    pub event_id: Uuid,
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub stock: i32,
    pub timestamp: DateTime<Utc>,
}

/// Why a delivered payload could not be turned into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON, or fields of the wrong shape.
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload has no string `eventType`.
    #[error("Event payload has no eventType")]
    MissingEventType,

    /// A well-formed event of a type this build does not know.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Decoded, but the content breaks a domain rule.
    #[error("Invalid event: {0}")]
    Invalid(#[from] ValidationError),
}

impl IntegrationEvent {
    /// Builds the event describing a freshly inserted order.
    pub fn order_created(order: &Order) -> Self {
        IntegrationEvent::OrderCreated(OrderCreated {
            event_id: Uuid::new_v4(),
            order_id: order.id,
            customer_id: order.customer_id,
            total: order.total,
            items: order.items.clone(),
            timestamp: order.created_at,
        })
    }

    /// Builds the event describing a freshly inserted product.
    pub fn product_created(product: &Product) -> Self {
        IntegrationEvent::ProductCreated(ProductCreated {
            event_id: Uuid::new_v4(),
            product_id: product.id,
            name: product.name.clone(),
            category: product.category.clone(),
            price: product.price,
            stock: product.stock,
            timestamp: product.created_at,
        })
    }

    /// The `eventType` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated(_) => "OrderCreated",
            IntegrationEvent::ProductCreated(_) => "ProductCreated",
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            IntegrationEvent::OrderCreated(e) => e.event_id,
            IntegrationEvent::ProductCreated(e) => e.event_id,
        }
    }

    /// When the described mutation happened on the write side.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            IntegrationEvent::OrderCreated(e) => e.timestamp,
            IntegrationEvent::ProductCreated(e) => e.timestamp,
        }
    }

    /// Broker topic for this event's category.
    pub fn topic(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated(_) => ORDER_EVENTS_TOPIC,
            IntegrationEvent::ProductCreated(_) => PRODUCT_EVENTS_TOPIC,
        }
    }

    /// Decodes and validates a payload received from the broker.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;

        let event_type = value
            .get("eventType")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingEventType)?;
        if !KNOWN_EVENT_TYPES.contains(&event_type) {
            return Err(DecodeError::UnknownEventType(event_type.to_string()));
        }

        let event: IntegrationEvent = serde_json::from_value(value)?;
        event.validate()?;
        Ok(event)
    }

    /// Checks required fields before the event is applied anywhere.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            IntegrationEvent::OrderCreated(e) => {
                if !e.order_id.is_valid() {
                    return Err(ValidationError::InvalidId {
                        field: "orderId",
                        value: e.order_id.as_i64(),
                    });
                }
                if !e.customer_id.is_valid() {
                    return Err(ValidationError::InvalidId {
                        field: "customerId",
                        value: e.customer_id.as_i64(),
                    });
                }
                if e.items.is_empty() {
                    return Err(ValidationError::NoItems);
                }
                for item in &e.items {
                    item.validate()?;
                }
                let expected = items_total(&e.items)?;
                // One cent of slack for producers that sum in floating point.
                if expected.abs_diff(e.total) > 1 {
                    return Err(ValidationError::TotalMismatch {
                        expected,
                        actual: e.total,
                    });
                }
                Ok(())
            }
            IntegrationEvent::ProductCreated(e) => {
                if !e.product_id.is_valid() {
                    return Err(ValidationError::InvalidId {
                        field: "productId",
                        value: e.product_id.as_i64(),
                    });
                }
                if e.name.trim().is_empty() {
                    return Err(ValidationError::Empty { field: "name" });
                }
                check_text("name", &e.name)?;
                check_text("category", &e.category)?;
                if e.price.is_negative() {
                    return Err(ValidationError::NegativePrice { price: e.price });
                }
                if e.stock < 0 {
                    return Err(ValidationError::NegativeStock { stock: e.stock });
                }
                Ok(())
            }
        }
    }
}
