//! HTTP API server with observability for the outbox sync system.
//!
//! Provides REST endpoints for the write side (products, orders) and the
//! query side (analytics views, projection lag), with structured logging
//! (tracing) and Prometheus metrics. The relay and projector run as
//! background tasks next to the server, see [`workers`].

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod workers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::WriteStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::ReadModelStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use state::AppState;
pub use workers::Workers;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<W, R>(state: Arc<AppState<W, R>>, metrics_handle: PrometheusHandle) -> Router
where
    W: WriteStore + 'static,
    R: ReadModelStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<W, R>))
        .route(
            "/products",
            post(routes::products::create::<W, R>).get(routes::products::list::<W, R>),
        )
        .route(
            "/orders",
            post(routes::orders::create::<W, R>).get(routes::orders::list::<W, R>),
        )
        .route("/orders/{id}", get(routes::orders::get::<W, R>))
        .route(
            "/analytics/products/{id}",
            get(routes::analytics::product_sales::<W, R>),
        )
        .route(
            "/analytics/orders/{id}",
            get(routes::analytics::order::<W, R>),
        )
        .route(
            "/analytics/catalog/{id}",
            get(routes::analytics::catalog_entry::<W, R>),
        )
        .route(
            "/analytics/dead-letters",
            get(routes::analytics::dead_letters::<W, R>),
        )
        .route("/analytics/lag", get(routes::analytics::lag::<W, R>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Registers descriptions for every metric the process emits, so `/metrics`
/// carries HELP lines even before the first sample.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "outbox_events_written_total",
        "Events appended to the outbox together with their write"
    );
    metrics::describe_counter!(
        "relay_events_published_total",
        "Outbox events published to the broker and marked"
    );
    metrics::describe_counter!(
        "relay_publish_failures_total",
        "Publish attempts the broker did not confirm"
    );
    metrics::describe_counter!(
        "relay_mark_failures_total",
        "Confirmed publishes whose outbox row could not be marked"
    );
    metrics::describe_histogram!(
        "relay_cycle_duration_seconds",
        metrics::Unit::Seconds,
        "Duration of one claim-publish-mark cycle"
    );
    metrics::describe_counter!(
        "projector_events_applied_total",
        "Events applied to the read models"
    );
    metrics::describe_counter!(
        "projector_duplicates_total",
        "Redelivered events skipped by the processed-event check"
    );
    metrics::describe_counter!(
        "projector_dead_letters_total",
        "Undecodable or invalid deliveries parked as dead letters"
    );
    metrics::describe_gauge!(
        "projection_lag_seconds",
        metrics::Unit::Seconds,
        "Age of the newest event reflected in the read models"
    );
}
