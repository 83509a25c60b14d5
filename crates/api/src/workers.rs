//! Background tasks running next to the HTTP server.

use broker::Broker;
use common::HealthRegistry;
use outbox::OutboxStore;
use projections::{Projector, ReadModelStore};
use relay::{OutboxRelay, RelayConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handles to the relay and projector tasks.
pub struct Workers {
    relay: JoinHandle<()>,
    projector: JoinHandle<()>,
}

/// Spawns one relay and one projector sharing `broker`.
///
/// Both stop after their current unit of work once `shutdown` flips to
/// `true`; await [`Workers::join`] afterwards.
pub fn spawn<S, B, R>(
    outbox: S,
    broker: B,
    read_models: R,
    relay_config: RelayConfig,
    health: &HealthRegistry,
    shutdown: watch::Receiver<bool>,
) -> Workers
where
    S: OutboxStore + 'static,
    B: Broker + Clone + 'static,
    R: ReadModelStore + 'static,
{
    tracing::info!(
        worker_id = %relay_config.worker_id,
        batch_size = relay_config.batch_size,
        "starting background workers"
    );

    let relay = OutboxRelay::new(outbox, broker.clone(), relay_config).with_health(health.clone());
    let relay_shutdown = shutdown.clone();
    let relay = tokio::spawn(async move { relay.run(relay_shutdown).await });

    let projector = Projector::new(read_models, broker).with_health(health.clone());
    let projector = tokio::spawn(async move { projector.run(shutdown).await });

    Workers { relay, projector }
}

impl Workers {
    /// Waits for both tasks to finish.
    pub async fn join(self) {
        if let Err(err) = self.relay.await {
            tracing::error!(error = %err, "relay task failed");
        }
        if let Err(err) = self.projector.await {
            tracing::error!(error = %err, "projector task failed");
        }
        tracing::info!("background workers stopped");
    }
}
