//! Query-side endpoints served from the read models.
//!
//! Everything here is eventually consistent with the write side; clients
//! can check `/analytics/lag` for how far behind the views are.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, ProductId};
use domain::WriteStore;
use projections::{
    CatalogEntry, DeadLetter, LagReport, OrderSummary, ProductSales, ReadModelStore,
};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /analytics/products/{id} — zeros for products without sales.
pub async fn product_sales<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductSales>, ApiError> {
    let id = ProductId::new(id);
    let sales = state
        .read_models
        .product_sales(id)
        .await?
        .unwrap_or_else(|| ProductSales::empty(id));
    Ok(Json(sales))
}

/// GET /analytics/orders/{id}
pub async fn order<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderSummary>, ApiError> {
    state
        .read_models
        .order(OrderId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not projected")))
}

/// GET /analytics/catalog/{id}
pub async fn catalog_entry<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
    Path(id): Path<i64>,
) -> Result<Json<CatalogEntry>, ApiError> {
    state
        .read_models
        .catalog_entry(ProductId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not projected")))
}

/// GET /analytics/dead-letters
pub async fn dead_letters<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
) -> Result<Json<Vec<DeadLetter>>, ApiError> {
    Ok(Json(state.read_models.dead_letters().await?))
}

/// GET /analytics/lag
pub async fn lag<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
) -> Result<Json<LagReport>, ApiError> {
    Ok(Json(state.lag.report().await?))
}
