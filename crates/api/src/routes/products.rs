//! Shopper-facing stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use inventory::ProductAvailability;
use ledger::LedgerStore;

use crate::AppState;
use crate::error::ApiError;

/// GET /products: products on sale right now with live stock.
#[tracing::instrument(skip(state))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductAvailability>>, ApiError> {
    let products = state.service.reports().live_products().await?;
    Ok(Json(products))
}

/// GET /products/{id}/stock
#[tracing::instrument(skip(state))]
pub async fn stock<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductAvailability>, ApiError> {
    let stock = state
        .service
        .reports()
        .live_stock(ProductId::new(id))
        .await?;
    Ok(Json(stock))
}
