use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    Broker, BrokerError, Delivery, DeliveryStream, DeliveryTag, PublishedMessage, Result,
};

/// How many confirmed messages [`InMemoryBroker::published`] remembers.
pub const PUBLISHED_LOG_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct InFlight {
    message: Message,
    subscription: u64,
}

/// One durable queue per topic. Messages move from `ready` to `unacked`
/// when delivered and leave the broker only on ack.
#[derive(Debug, Default)]
struct TopicQueue {
    ready: VecDeque<Message>,
    unacked: BTreeMap<DeliveryTag, InFlight>,
}

impl TopicQueue {
    /// Moves the matching in-flight messages back to the head of the queue,
    /// oldest first, flagged as redelivered.
    fn requeue_where(&mut self, mut matches: impl FnMut(&InFlight) -> bool) -> usize {
        let tags: Vec<DeliveryTag> = self
            .unacked
            .iter()
            .filter(|(_, in_flight)| matches(in_flight))
            .map(|(tag, _)| *tag)
            .collect();
        for tag in tags.iter().rev() {
            if let Some(InFlight { mut message, .. }) = self.unacked.remove(tag) {
                message.redelivered = true;
                self.ready.push_front(message);
            }
        }
        tags.len()
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicQueue>,
    published: VecDeque<PublishedMessage>,
    next_tag: u64,
    next_subscription: u64,
    unavailable: bool,
    fail_next_publish: bool,
    closed: bool,
}

impl BrokerState {
    fn check_available(&self) -> Result<()> {
        if self.closed {
            return Err(BrokerError::Closed);
        }
        if self.unavailable {
            return Err(BrokerError::Unavailable("broker is offline".to_string()));
        }
        Ok(())
    }

    fn pop_ready(&mut self, topic: &str, subscription: u64) -> Option<Delivery> {
        let queue = self.topics.get_mut(topic)?;
        let message = queue.ready.pop_front()?;

        self.next_tag += 1;
        let tag = DeliveryTag::new(self.next_tag);
        let delivery = Delivery {
            tag,
            topic: topic.to_string(),
            payload: message.payload.clone(),
            redelivered: message.redelivered,
        };
        queue.unacked.insert(
            tag,
            InFlight {
                message,
                subscription,
            },
        );
        Some(delivery)
    }

    fn take_unacked(&mut self, delivery: &Delivery) -> Result<Message> {
        self.topics
            .get_mut(&delivery.topic)
            .and_then(|queue| queue.unacked.remove(&delivery.tag))
            .map(|in_flight| in_flight.message)
            .ok_or(BrokerError::UnknownDelivery(delivery.tag))
    }

    fn record_published(&mut self, topic: &str, payload: &[u8]) {
        if self.published.len() == PUBLISHED_LOG_CAPACITY {
            self.published.pop_front();
        }
        self.published.push_back(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}

/// In-process broker with durable per-topic queues.
///
/// Behaves like a single-node broker with publisher confirms and manual
/// acknowledgment: a published message stays queued until some consumer
/// acks it. Deliveries still unacked when their subscription stream is
/// dropped go back to the head of the queue flagged as redelivered, as a
/// broker does when a consumer's channel closes;
/// [`recover`](InMemoryBroker::recover) does the same for every
/// subscription at once. Consumers on the same topic compete for messages.
///
/// Queues live in process memory. Use a durable backend when messages must
/// survive a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

/// Unfold state of one subscription stream. Dropping it hands the
/// subscription's unacked deliveries back to the queue.
struct Subscription {
    broker: InMemoryBroker,
    topic: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let requeued = self
            .broker
            .lock()
            .topics
            .get_mut(&self.topic)
            .map_or(0, |queue| {
                queue.requeue_where(|in_flight| in_flight.subscription == self.id)
            });
        if requeued > 0 {
            tracing::debug!(
                topic = %self.topic,
                subscription = self.id,
                requeued,
                "subscription dropped, unacked deliveries requeued"
            );
            self.broker.notify.notify_waiters();
        }
    }
}

impl InMemoryBroker {
    /// Creates a new broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    // Never held across an await.
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the broker offline (or back online). While offline, publish,
    /// ack and nack fail and subscriptions receive nothing.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
        self.notify.notify_waiters();
    }

    /// Makes the next publish fail without queuing the message.
    pub async fn fail_next_publish(&self) {
        self.lock().fail_next_publish = true;
    }

    /// Returns every unacked delivery to the head of its queue, flagged as
    /// redelivered.
    pub async fn recover(&self) {
        {
            let mut state = self.lock();
            for queue in state.topics.values_mut() {
                queue.requeue_where(|_| true);
            }
        }
        self.notify.notify_waiters();
    }

    /// Shuts the broker down; open subscriptions end.
    pub async fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// The most recent confirmed messages (up to
    /// [`PUBLISHED_LOG_CAPACITY`]), in confirmation order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.iter().cloned().collect()
    }

    /// Number of messages waiting to be delivered on `topic`.
    pub async fn queue_depth(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |queue| queue.ready.len())
    }

    /// Number of delivered but unacknowledged messages on `topic`.
    pub async fn unacked_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |queue| queue.unacked.len())
    }

    async fn next_delivery(&self, topic: &str, subscription: u64) -> Option<Delivery> {
        loop {
            // Registered before the queue is inspected so a publish between
            // the check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if !state.unavailable
                    && let Some(delivery) = state.pop_ready(topic, subscription)
                {
                    return Some(delivery);
                }
            }

            notified.await;
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        {
            let mut state = self.lock();
            state.check_available()?;
            if state.fail_next_publish {
                state.fail_next_publish = false;
                return Err(BrokerError::PublishRejected {
                    topic: topic.to_string(),
                    reason: "injected publish failure".to_string(),
                });
            }

            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .ready
                .push_back(Message {
                    payload: payload.to_vec(),
                    redelivered: false,
                });
            state.record_published(topic, payload);
        }

        tracing::debug!(topic, bytes = payload.len(), "message confirmed");
        self.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream> {
        let id = {
            let mut state = self.lock();
            state.check_available()?;
            state.topics.entry(topic.to_string()).or_default();
            state.next_subscription += 1;
            state.next_subscription
        };

        let subscription = Subscription {
            broker: self.clone(),
            topic: topic.to_string(),
            id,
        };
        let stream = futures_util::stream::unfold(subscription, |subscription| async move {
            let delivery = subscription
                .broker
                .next_delivery(&subscription.topic, subscription.id)
                .await?;
            Some((Ok(delivery), subscription))
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.lock();
        state.check_available()?;
        state.take_unacked(delivery)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        {
            let mut state = self.lock();
            state.check_available()?;
            let mut message = state.take_unacked(delivery)?;
            if !requeue {
                tracing::warn!(topic = %delivery.topic, tag = %delivery.tag, "message dropped by nack");
                return Ok(());
            }
            message.redelivered = true;
            if let Some(queue) = state.topics.get_mut(&delivery.topic) {
                queue.ready.push_front(message);
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;

    async fn next(stream: &mut DeliveryStream) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timed out waiting for delivery")
            .expect("stream ended")
            .unwrap()
    }

    async fn nothing_within(stream: &mut DeliveryStream, wait: Duration) -> bool {
        tokio::time::timeout(wait, stream.next()).await.is_err()
    }

    #[tokio::test]
    async fn messages_published_before_subscribe_are_kept() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        broker.publish("order-events", b"two").await.unwrap();

        let mut stream = broker.subscribe("order-events").await.unwrap();

        assert_eq!(next(&mut stream).await.payload, b"one");
        assert_eq!(next(&mut stream).await.payload, b"two");
    }

    #[tokio::test]
    async fn subscriber_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("order-events", b"late").await.unwrap();
        });

        assert_eq!(next(&mut stream).await.payload, b"late");
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let broker = InMemoryBroker::new();
        broker.publish("product-events", b"p").await.unwrap();

        let mut orders = broker.subscribe("order-events").await.unwrap();
        assert!(nothing_within(&mut orders, Duration::from_millis(50)).await);
        assert_eq!(broker.queue_depth("product-events").await, 1);
    }

    #[tokio::test]
    async fn acked_message_is_gone() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        let delivery = next(&mut stream).await;
        assert_eq!(broker.unacked_count("order-events").await, 1);
        broker.ack(&delivery).await.unwrap();

        broker.recover().await;
        assert_eq!(broker.unacked_count("order-events").await, 0);
        assert_eq!(broker.queue_depth("order-events").await, 0);
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_recover() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        broker.publish("order-events", b"two").await.unwrap();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        let first = next(&mut stream).await;
        assert!(!first.redelivered);

        broker.recover().await;

        let again = next(&mut stream).await;
        assert_eq!(again.payload, b"one");
        assert!(again.redelivered);
        assert_ne!(again.tag, first.tag);
        assert_eq!(next(&mut stream).await.payload, b"two");
    }

    #[tokio::test]
    async fn dropped_stream_hands_back_its_unacked_deliveries() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        broker.publish("order-events", b"two").await.unwrap();

        let mut stream = broker.subscribe("order-events").await.unwrap();
        let first = next(&mut stream).await;
        assert!(!first.redelivered);
        drop(stream);

        assert_eq!(broker.unacked_count("order-events").await, 0);
        let mut stream = broker.subscribe("order-events").await.unwrap();
        let again = next(&mut stream).await;
        assert_eq!(again.payload, b"one");
        assert!(again.redelivered);
        assert_eq!(next(&mut stream).await.payload, b"two");
    }

    #[tokio::test]
    async fn dropped_stream_leaves_other_subscriptions_in_flight() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        broker.publish("order-events", b"two").await.unwrap();

        let mut kept = broker.subscribe("order-events").await.unwrap();
        let mut dropped = broker.subscribe("order-events").await.unwrap();
        let held = next(&mut kept).await;
        next(&mut dropped).await;
        drop(dropped);

        assert_eq!(broker.unacked_count("order-events").await, 1);
        assert_eq!(broker.queue_depth("order-events").await, 1);
        broker.ack(&held).await.unwrap();
    }

    #[tokio::test]
    async fn published_log_keeps_only_the_most_recent() {
        let broker = InMemoryBroker::new();
        let total = PUBLISHED_LOG_CAPACITY + 5;
        for i in 0..total {
            broker
                .publish("order-events", i.to_string().as_bytes())
                .await
                .unwrap();
        }

        let published = broker.published().await;
        assert_eq!(published.len(), PUBLISHED_LOG_CAPACITY);
        assert_eq!(published[0].payload, b"5");
        assert_eq!(published.last().unwrap().payload, (total - 1).to_string().as_bytes());
        assert_eq!(broker.queue_depth("order-events").await, total);
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers_first() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        broker.publish("order-events", b"two").await.unwrap();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        let first = next(&mut stream).await;
        broker.nack(&first, true).await.unwrap();

        let again = next(&mut stream).await;
        assert_eq!(again.payload, b"one");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn nack_without_requeue_drops() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        let first = next(&mut stream).await;
        broker.nack(&first, false).await.unwrap();
        broker.recover().await;

        assert!(nothing_within(&mut stream, Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn double_ack_is_unknown_delivery() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        let delivery = next(&mut stream).await;
        broker.ack(&delivery).await.unwrap();

        assert!(matches!(
            broker.ack(&delivery).await,
            Err(BrokerError::UnknownDelivery(tag)) if tag == delivery.tag
        ));
    }

    #[tokio::test]
    async fn offline_broker_rejects_publish_and_holds_deliveries() {
        let broker = InMemoryBroker::new();
        broker.publish("order-events", b"one").await.unwrap();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        broker.set_unavailable(true).await;
        let err = broker.publish("order-events", b"two").await.unwrap_err();
        assert!(err.is_transient());
        assert!(nothing_within(&mut stream, Duration::from_millis(50)).await);

        broker.set_unavailable(false).await;
        assert_eq!(next(&mut stream).await.payload, b"one");
        assert_eq!(broker.published().await.len(), 1);
    }

    #[tokio::test]
    async fn injected_publish_failure_queues_nothing() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publish().await;

        assert!(matches!(
            broker.publish("order-events", b"one").await,
            Err(BrokerError::PublishRejected { .. })
        ));
        assert_eq!(broker.queue_depth("order-events").await, 0);
        broker.publish("order-events", b"one").await.unwrap();
        assert_eq!(broker.queue_depth("order-events").await, 1);
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe("order-events").await.unwrap();

        broker.close().await;

        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
        assert!(matches!(
            broker.publish("order-events", b"x").await,
            Err(BrokerError::Closed)
        ));
    }

    #[tokio::test]
    async fn competing_consumers_split_messages() {
        let broker = InMemoryBroker::new();
        for i in 0..4u8 {
            broker.publish("order-events", &[i]).await.unwrap();
        }

        let mut a = broker.subscribe("order-events").await.unwrap();
        let mut b = broker.subscribe("order-events").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(next(&mut a).await.payload[0]);
            seen.push(next(&mut b).await.payload[0]);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
