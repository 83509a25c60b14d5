use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{Delivery, Result};

/// Stream of deliveries for one subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// A message broker with durable topics and at-least-once delivery.
///
/// Implementations must only return `Ok` from [`publish`](Broker::publish)
/// once the message is durably accepted (a publisher confirm), and must
/// redeliver any delivery that is neither acked nor nacked without requeue.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a message and waits for the broker's confirmation.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Subscribes to a topic as a competing consumer.
    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream>;

    /// Acknowledges a delivery; the broker forgets the message.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Rejects a delivery. With `requeue` the message goes back to the
    /// head of its queue and is redelivered; without it the message is
    /// dropped.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;
}
