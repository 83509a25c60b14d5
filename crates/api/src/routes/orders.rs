//! Order command and write-side read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{CreateOrder, Money, Order, WriteStore};
use projections::ReadModelStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub total: Money,
}

/// POST /orders — validate, then write the order and its outbox event in one
/// transaction.
#[tracing::instrument(skip(state, cmd))]
pub async fn create<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
    Json(cmd): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let committed = state.commands.create_order(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: committed.record.id,
            total: committed.record.total,
        }),
    ))
}

/// GET /orders
pub async fn list<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.commands.list_orders().await?))
}

/// GET /orders/{id}
pub async fn get<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    state
        .commands
        .get_order(OrderId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}
