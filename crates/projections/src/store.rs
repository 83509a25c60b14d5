use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::IntegrationEvent;

use crate::Result;
use crate::views::{CatalogEntry, DeadLetter, OrderSummary, ProductSales};

/// Result of applying one event to the read models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was new and its effects are committed.
    Applied,
    /// The event id was already recorded; nothing changed.
    Duplicate,
}

/// Storage for the query side.
///
/// [`apply`](ReadModelStore::apply) is the only write path for views. It must
/// be atomic: the processed-event record, every view update and the watermark
/// advance commit together or not at all, so a redelivered event is either
/// fully applied once or recognised as a duplicate.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Applies an event exactly once per event id.
    async fn apply(&self, event: &IntegrationEvent) -> Result<ApplyOutcome>;

    /// Stores a message that could not be decoded.
    async fn park_dead_letter(&self, topic: &str, payload: &str, reason: &str) -> Result<()>;

    /// Newest event timestamp applied so far.
    async fn watermark(&self) -> Result<Option<DateTime<Utc>>>;

    async fn order(&self, id: OrderId) -> Result<Option<OrderSummary>>;

    async fn product_sales(&self, id: ProductId) -> Result<Option<ProductSales>>;

    async fn catalog_entry(&self, id: ProductId) -> Result<Option<CatalogEntry>>;

    /// Parked messages, oldest first.
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}
