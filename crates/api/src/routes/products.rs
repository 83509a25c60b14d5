//! Product command endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::ProductId;
use domain::{CreateProduct, Product, WriteStore};
use projections::ReadModelStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreatedResponse {
    pub product_id: ProductId,
}

/// POST /products
#[tracing::instrument(skip(state, cmd))]
pub async fn create<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
    Json(cmd): Json<CreateProduct>,
) -> Result<(StatusCode, Json<ProductCreatedResponse>), ApiError> {
    let committed = state.commands.create_product(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProductCreatedResponse {
            product_id: committed.record.id,
        }),
    ))
}

/// GET /products
pub async fn list<W: WriteStore + 'static, R: ReadModelStore + 'static>(
    State(state): State<Arc<AppState<W, R>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.commands.list_products().await?))
}
