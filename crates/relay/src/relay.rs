use std::time::{Duration, Instant};

use broker::Broker;
use common::HealthRegistry;
use outbox::{OutboxEvent, OutboxId, OutboxStore};
use tokio::sync::watch;

use crate::{HEALTH_COMPONENT, RelayConfig, RelayError, Result};

/// What one relay cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayCycleReport {
    pub claimed: usize,
    pub published: usize,
    /// Published, but another relay had already marked the row after this
    /// relay's lease ran out.
    pub already_marked: usize,
    /// Claims handed back without publishing.
    pub released: usize,
}

impl RelayCycleReport {
    /// True when there was nothing pending.
    pub fn is_idle(&self) -> bool {
        self.claimed == 0
    }
}

/// Forwards pending outbox events to the broker.
///
/// Per event the order is always publish, wait for the confirm, then mark.
/// Nothing is marked without a confirm, so the worst a crash can do is a
/// second publish of the same event.
pub struct OutboxRelay<S, B> {
    store: S,
    broker: B,
    config: RelayConfig,
    health: HealthRegistry,
}

impl<S, B> OutboxRelay<S, B> {
    /// Creates a relay with its own health registry.
    pub fn new(store: S, broker: B, config: RelayConfig) -> Self {
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

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }
}

impl<S: OutboxStore, B: Broker> OutboxRelay<S, B> {
    /// Claims one batch and forwards it.
    ///
    /// On a publish failure the batch stops and the unpublished claims are
    /// released so any relay can retry them on its next cycle. A mark
    /// failure releases the published row together with the rest of the
    /// batch, so the row is republished first on the next cycle.
    pub async fn run_cycle(&self) -> Result<RelayCycleReport> {
        self.cycle(None).await
    }

    /// Runs cycles until `shutdown` turns true (or its sender is dropped).
    ///
    /// Shutdown is checked between events only, so a publish and its mark
    /// are never split by a graceful stop. Failed cycles are retried with
    /// the configured backoff; errors are logged and never end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "outbox relay started"
        );

        let mut failures = 0u32;
        while !*shutdown.borrow() {
            let delay = match self.cycle(Some(&shutdown)).await {
                Ok(report) => {
                    if failures > 0 {
                        tracing::info!(failures, "outbox relay recovered");
                    }
                    failures = 0;
                    self.health.healthy(HEALTH_COMPONENT);

                    if report.claimed >= self.config.batch_size {
                        // Backlog: go again without waiting.
                        Duration::ZERO
                    } else {
                        self.config.poll_interval
                    }
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    let delay = self.config.retry.delay_for(failures);
                    tracing::warn!(
                        error = %err,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        "relay cycle failed, events stay pending"
                    );
                    self.health.degraded(HEALTH_COMPONENT, err.to_string());
                    delay
                }
            };

            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "outbox relay stopped");
    }

    #[tracing::instrument(skip(self, shutdown), fields(worker_id = %self.config.worker_id))]
    async fn cycle(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<RelayCycleReport> {
        let started = Instant::now();

        let batch = self
            .store
            .claim_pending(
                &self.config.worker_id,
                self.config.batch_size,
                self.config.claim_lease,
            )
            .await?;

        let mut report = RelayCycleReport {
            claimed: batch.len(),
            ..Default::default()
        };
        let outcome = self.forward(&batch, shutdown, &mut report).await;

        metrics::histogram!("relay_cycle_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if report.published > 0 {
            tracing::debug!(
                claimed = report.claimed,
                published = report.published,
                "relay cycle complete"
            );
        }

        outcome.map(|()| report)
    }

    async fn forward(
        &self,
        batch: &[OutboxEvent],
        shutdown: Option<&watch::Receiver<bool>>,
        report: &mut RelayCycleReport,
    ) -> Result<()> {
        for (index, event) in batch.iter().enumerate() {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!(
                    remaining = batch.len() - index,
                    "shutdown requested, releasing claims"
                );
                report.released += self.release(&batch[index..]).await;
                return Ok(());
            }

            let payload = match event.payload_bytes() {
                Ok(payload) => payload,
                Err(source) => {
                    report.released += self.release(&batch[index..]).await;
                    return Err(RelayError::Encode {
                        id: event.id,
                        source,
                    });
                }
            };

            if let Err(source) = self.broker.publish(&event.topic, &payload).await {
                metrics::counter!("relay_publish_failures_total", "topic" => event.topic.clone())
                    .increment(1);
                report.released += self.release(&batch[index..]).await;
                return Err(RelayError::BrokerUnavailable {
                    id: event.id,
                    source,
                });
            }

            match self.store.mark_published(event.id).await {
                Ok(true) => {
                    report.published += 1;
                    metrics::counter!("relay_events_published_total", "topic" => event.topic.clone())
                        .increment(1);
                    tracing::debug!(id = %event.id, topic = %event.topic, "event published");
                }
                Ok(false) => {
                    report.already_marked += 1;
                    tracing::debug!(id = %event.id, "event was already marked published");
                }
                Err(err) => {
                    metrics::counter!("relay_mark_failures_total").increment(1);
                    tracing::warn!(
                        id = %event.id,
                        error = %err,
                        "published but not marked, will be republished"
                    );
                    report.released += self.release(&batch[index..]).await;
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }

    async fn release(&self, events: &[OutboxEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }

        let ids: Vec<OutboxId> = events.iter().map(|e| e.id).collect();
        match self.store.release(&self.config.worker_id, &ids).await {
            Ok(()) => ids.len(),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    count = ids.len(),
                    "could not release claims, they expire with the lease"
                );
                0
            }
        }
    }
}
