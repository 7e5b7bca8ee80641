//! Operator views: aggregate metrics, per-product snapshot and ledger audit.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use inventory::{AuditReport, InventoryMetrics, ProductSnapshot};
use ledger::LedgerStore;

use crate::AppState;
use crate::error::ApiError;

/// GET /admin/metrics
#[tracing::instrument(skip(state))]
pub async fn metrics<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<InventoryMetrics>, ApiError> {
    Ok(Json(state.service.reports().inventory_metrics().await?))
}

/// GET /admin/products
#[tracing::instrument(skip(state))]
pub async fn products<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductSnapshot>>, ApiError> {
    Ok(Json(state.service.reports().product_snapshot().await?))
}

/// GET /admin/products/{id}/audit: replay the product's ledger.
#[tracing::instrument(skip(state))]
pub async fn audit<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<AuditReport>, ApiError> {
    Ok(Json(
        state
            .service
            .reports()
            .audit_product(ProductId::new(id))
            .await?,
    ))
}
