//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config, LogFormat, db, workers};
use broker::{Broker, InMemoryBroker};
use common::HealthRegistry;
use domain::{InMemoryWriteStore, PostgresWriteStore, WriteStore};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{InMemoryOutbox, OutboxStore, PostgresOutbox};
use projections::{InMemoryReadModels, PostgresReadModels, ReadModelStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing(config: &Config) {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::describe_metrics();

    // 3. Pick the stores
    match &config.database_url {
        Some(url) => {
            let pool = db::connect_with_retry(url, &config.connect_retry()).await?;
            let outbox = PostgresOutbox::new(pool.clone());
            outbox.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");

            serve(
                &config,
                PostgresWriteStore::new(pool.clone()),
                outbox,
                config.postgres_broker(pool.clone()),
                PostgresReadModels::new(pool),
                metrics_handle,
            )
            .await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores and broker");
            let outbox = InMemoryOutbox::new();

            serve(
                &config,
                InMemoryWriteStore::with_outbox(outbox.clone()),
                outbox,
                InMemoryBroker::new(),
                InMemoryReadModels::new(),
                metrics_handle,
            )
            .await
        }
    }
}

/// Runs the HTTP server and the background workers until a shutdown signal.
async fn serve<W, S, B, R>(
    config: &Config,
    write_store: W,
    outbox: S,
    broker: B,
    read_models: R,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError>
where
    W: WriteStore + 'static,
    S: OutboxStore + 'static,
    B: Broker + Clone + 'static,
    R: ReadModelStore + Clone + 'static,
{
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // 4. Start the relay and projector
    let health = HealthRegistry::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = workers::spawn(
        outbox,
        broker,
        read_models.clone(),
        config.relay_config(),
        &health,
        shutdown_rx,
    );

    // 5. Build the application and serve
    let state = Arc::new(AppState::new(write_store, read_models, health));
    let app = api::create_app(state, metrics_handle);

    tracing::info!(%addr, "starting API server");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 6. Let the workers finish their current unit of work
    let _ = shutdown_tx.send(true);
    workers.join().await;

    served?;
    tracing::info!("server shut down gracefully");
    Ok(())
}
