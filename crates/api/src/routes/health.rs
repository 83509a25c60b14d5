//! Health check endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::ComponentHealth;
use domain::WriteStore;
use projections::ReadModelStore;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// GET /health — `ok` while every background component is healthy,
/// `degraded` with 503 otherwise.
pub async fn check<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let components = state.health.snapshot();
    let healthy = components.values().all(ComponentHealth::is_healthy);

    let (status, label) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label,
            components,
        }),
    )
}
