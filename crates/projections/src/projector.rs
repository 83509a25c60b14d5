//! Broker consumer that feeds the read models.

use std::time::Duration;

use broker::{Broker, Delivery, DeliveryStream};
use common::{HealthRegistry, RetryPolicy};
use domain::{IntegrationEvent, ORDER_EVENTS_TOPIC, PRODUCT_EVENTS_TOPIC};
use futures_util::StreamExt;
use tokio::sync::watch;

use crate::{ProjectionError, Result};
use crate::store::{ApplyOutcome, ReadModelStore};

/// Name under which the projector reports to the health registry.
pub const HEALTH_COMPONENT: &str = "projector";

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Effects committed, delivery acked.
    Applied,
    /// Event id seen before, delivery acked without changes.
    Duplicate,
    /// Undecodable, invalid or refused by the store; parked in dead
    /// letters and acked.
    DeadLettered,
}

/// Projector settings.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    pub topics: Vec<String>,
    /// Backoff after failed deliveries or lost subscriptions.
    pub retry: RetryPolicy,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            topics: vec![
                ORDER_EVENTS_TOPIC.to_string(),
                PRODUCT_EVENTS_TOPIC.to_string(),
            ],
            retry: RetryPolicy::unbounded(),
        }
    }
}

impl ProjectorConfig {
    pub fn with_topics<I, T>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Applies broker deliveries to a [`ReadModelStore`].
///
/// A delivery is acked only after its effect is committed. Transient
/// failures nack it back onto the queue, so a crash or outage turns into a
/// redelivery that the store's event-id dedup absorbs.
pub struct Projector<R, B> {
    store: R,
    broker: B,
    config: ProjectorConfig,
    health: HealthRegistry,
}

impl<R, B> Projector<R, B> {
    pub fn new(store: R, broker: B) -> Self {
        Self::with_config(store, broker, ProjectorConfig::default())
    }

    pub fn with_config(store: R, broker: B, config: ProjectorConfig) -> Self {
        Self {
            store,
            broker,
            config,
            health: HealthRegistry::new(),
        }
    }

    /// Reports into a shared health registry instead.
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn store(&self) -> &R {
        &self.store
    }
}

impl<R: ReadModelStore, B: Broker> Projector<R, B> {
    /// Handles one delivery and acks or nacks it.
    ///
    /// Returns an error only for transient failures, after the delivery has
    /// been nacked for redelivery.
    #[tracing::instrument(skip(self, delivery), fields(topic = %delivery.topic, tag = %delivery.tag, redelivered = delivery.redelivered))]
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<HandleOutcome> {
        match self.project(delivery).await {
            Ok(outcome) => {
                self.broker.ack(delivery).await?;
                match outcome {
                    HandleOutcome::Applied => {
                        metrics::counter!("projector_events_applied_total").increment(1)
                    }
                    HandleOutcome::Duplicate => {
                        metrics::counter!("projector_duplicates_total").increment(1)
                    }
                    HandleOutcome::DeadLettered => {
                        metrics::counter!("projector_dead_letters_total").increment(1)
                    }
                }
                Ok(outcome)
            }
            Err(err) => match self.broker.nack(delivery, true).await {
                Ok(()) => Err(err),
                Err(nack_err) => {
                    tracing::warn!(
                        error = %err,
                        nack_error = %nack_err,
                        "nack failed, delivery returns once the subscription is dropped"
                    );
                    Err(nack_err.into())
                }
            },
        }
    }

    async fn project(&self, delivery: &Delivery) -> Result<HandleOutcome> {
        let event = match IntegrationEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(err) => return self.dead_letter(delivery, &err.to_string()).await,
        };

        let outcome = match self.store.apply(&event).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_permanent() => {
                return self.dead_letter(delivery, &err.to_string()).await;
            }
            Err(err) => return Err(err),
        };

        match outcome {
            ApplyOutcome::Applied => {
                tracing::debug!(
                    event_id = %event.event_id(),
                    event_type = event.event_type(),
                    "event applied"
                );
                Ok(HandleOutcome::Applied)
            }
            ApplyOutcome::Duplicate => {
                tracing::debug!(event_id = %event.event_id(), "duplicate event skipped");
                Ok(HandleOutcome::Duplicate)
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<HandleOutcome> {
        self.store
            .park_dead_letter(&delivery.topic, &delivery.payload_text(), reason)
            .await?;
        tracing::error!(
            topic = %delivery.topic,
            reason,
            "unprojectable event parked in dead letters"
        );
        Ok(HandleOutcome::DeadLettered)
    }

    /// Consumes the configured topics until `shutdown` turns true (or its
    /// sender is dropped). A delivery in progress is always finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topics = ?self.config.topics, "projector started");

        let mut failures = 0u32;
        'subscription: while !*shutdown.borrow() {
            let mut deliveries = match self.subscribe().await {
                Ok(stream) => stream,
                Err(err) => {
                    failures = failures.saturating_add(1);
                    self.health.degraded(HEALTH_COMPONENT, err.to_string());
                    let delay = self.config.retry.delay_for(failures);
                    tracing::warn!(error = %err, failures, "subscribe failed");
                    if !self.pause(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };
            self.health.healthy(HEALTH_COMPONENT);

            loop {
                let next = tokio::select! {
                    next = deliveries.next() => next,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'subscription;
                        }
                        continue;
                    }
                };

                let delivery = match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "delivery stream failed, resubscribing");
                        self.health.degraded(HEALTH_COMPONENT, err.to_string());
                        failures = failures.saturating_add(1);
                        if !self.pause(self.config.retry.delay_for(failures), &mut shutdown).await {
                            break 'subscription;
                        }
                        break;
                    }
                    None => {
                        tracing::warn!("delivery stream ended, resubscribing");
                        failures = failures.saturating_add(1);
                        if !self.pause(self.config.retry.delay_for(failures), &mut shutdown).await {
                            break 'subscription;
                        }
                        break;
                    }
                };

                match self.handle_delivery(&delivery).await {
                    Ok(_) => {
                        if failures > 0 {
                            tracing::info!(failures, "projector recovered");
                            self.health.healthy(HEALTH_COMPONENT);
                        }
                        failures = 0;
                    }
                    Err(err) => {
                        // Broker errors leave the delivery unacked on this
                        // subscription; dropping it hands the delivery back.
                        let resubscribe = matches!(err, ProjectionError::Broker(_));
                        failures = failures.saturating_add(1);
                        let delay = self.config.retry.delay_for(failures);
                        tracing::warn!(
                            error = %err,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            "projection failed, delivery requeued"
                        );
                        self.health.degraded(HEALTH_COMPONENT, err.to_string());
                        if !self.pause(delay, &mut shutdown).await {
                            break 'subscription;
                        }
                        if resubscribe {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("projector stopped");
    }

    async fn subscribe(&self) -> Result<futures_util::stream::SelectAll<DeliveryStream>> {
        let mut streams = Vec::with_capacity(self.config.topics.len());
        for topic in &self.config.topics {
            streams.push(self.broker.subscribe(topic).await?);
        }
        Ok(futures_util::stream::select_all(streams))
    }

    /// Sleeps for `delay`; false if shutdown arrived first.
    async fn pause(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => !*shutdown.borrow(),
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topics_cover_both_event_categories() {
        let config = ProjectorConfig::default();
        assert_eq!(config.topics, vec!["order-events", "product-events"]);
    }

    #[test]
    fn topics_can_be_narrowed() {
        let config = ProjectorConfig::default().with_topics(["order-events"]);
        assert_eq!(config.topics, vec!["order-events"]);
    }
}
