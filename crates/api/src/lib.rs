//! HTTP API server for flash-sale holds.
//!
//! Exposes hold placement, confirmation, stock views and operator reports,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod customer;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use coordination::{AtomicCounter, InMemoryLock};
use inventory::{FlashSaleService, InventoryConfig, SystemClock};
use ledger::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore> {
    pub service: FlashSaleService<S>,
}

impl<S: LedgerStore> AppState<S> {
    pub fn new(service: FlashSaleService<S>) -> Arc<Self> {
        Arc::new(Self { service })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LedgerStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{id}/stock", get(routes::products::stock::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/confirm", post(routes::orders::confirm::<S>))
        .route("/admin/metrics", get(routes::admin::metrics::<S>))
        .route("/admin/products", get(routes::admin::products::<S>))
        .route(
            "/admin/products/{id}/audit",
            get(routes::admin::audit::<S>),
        )
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

/// Creates application state over `store` with an in-process lock and
/// counter and the system clock.
pub fn create_default_state<S: LedgerStore + Clone + 'static>(
    store: S,
    config: InventoryConfig,
) -> Arc<AppState<S>> {
    AppState::new(FlashSaleService::new(
        store,
        Arc::new(InMemoryLock::new()),
        Arc::new(AtomicCounter::oversell_blocked()),
        Arc::new(SystemClock),
        config,
    ))
}
