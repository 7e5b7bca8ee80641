//! Hold placement and confirmation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId};
use inventory::{HoldReceipt, OrderView};
use ledger::LedgerStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::customer::Customer;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub order_id: OrderId,
    pub status: &'static str,
}

/// POST /orders: reserve stock and open a pending hold.
#[tracing::instrument(skip(state, customer), fields(customer_id = %customer.0))]
pub async fn create<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    customer: Customer,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<HoldReceipt>), ApiError> {
    let receipt = state
        .service
        .create_hold(ProductId::new(req.product_id), req.quantity, &customer.0)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /orders/{id}/confirm
#[tracing::instrument(skip(state, customer), fields(customer_id = %customer.0))]
pub async fn confirm<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    customer: Customer,
    Path(id): Path<i64>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let order_id = OrderId::new(id);
    let outcome = state.service.confirm_order(order_id, &customer.0).await?;
    Ok(Json(ConfirmResponse {
        order_id,
        status: outcome.as_str(),
    }))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state, customer), fields(customer_id = %customer.0))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    customer: Customer,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let orders = state.service.list_orders(&customer.0).await?;
    Ok(Json(orders))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, customer), fields(customer_id = %customer.0))]
pub async fn get<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    customer: Customer,
    Path(id): Path<i64>,
) -> Result<Json<OrderView>, ApiError> {
    let order = state
        .service
        .get_order(OrderId::new(id), &customer.0)
        .await?;
    Ok(Json(order))
}
