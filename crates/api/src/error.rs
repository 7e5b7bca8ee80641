//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coordination::CoordinationError;
use inventory::InventoryError;
use ledger::LedgerError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No customer identity on the request.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error from the hold lifecycle.
    Inventory(InventoryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Inventory(err) => inventory_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, String) {
    match &err {
        InventoryError::ProductNotFound(_) | InventoryError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        InventoryError::SaleNotActive(_)
        | InventoryError::InvalidQuantity(_)
        | InventoryError::InvalidProduct(_)
        | InventoryError::InsufficientStock { .. }
        | InventoryError::OrderNotConfirmable { .. }
        | InventoryError::HoldExpired(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        InventoryError::LockUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        InventoryError::TransactionFailure(_) | InventoryError::Coordination(_) => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

/// Errors that abort server startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger setup failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Coordination backend unavailable: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Seeding failed: {0}")]
    Seed(#[from] InventoryError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
