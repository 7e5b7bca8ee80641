//! Inventory error types.

use common::{OrderId, ProductId};
use coordination::CoordinationError;
use ledger::{LedgerError, OrderStatus};
use thiserror::Error;

/// Errors surfaced by the hold lifecycle operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No product with that id exists.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product's sale window does not contain the current time.
    #[error("Sale for product {0} is not active")]
    SaleNotActive(ProductId),

    /// Requested quantity was zero or negative.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// The conditional decrement found fewer units than requested.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock { product_id: ProductId, requested: i64 },

    /// The per-product lock could not be acquired in time.
    #[error("Lock unavailable for {key}, try again")]
    LockUnavailable { key: String },

    /// Order missing, or owned by another customer.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Order is in a state that can never be confirmed.
    #[error("Order {order_id} cannot be confirmed from status {status}")]
    OrderNotConfirmable { order_id: OrderId, status: OrderStatus },

    /// The hold lapsed before confirmation; its stock has been released.
    #[error("Hold for order {0} has expired")]
    HoldExpired(OrderId),

    /// Invalid catalog input.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// The ledger transaction failed and was rolled back.
    #[error("Transaction failed: {0}")]
    TransactionFailure(#[source] LedgerError),

    /// The coordination backend failed for a reason other than contention.
    #[error("Coordination backend error: {0}")]
    Coordination(#[source] CoordinationError),
}

impl From<LedgerError> for InventoryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ProductNotFound(id) => InventoryError::ProductNotFound(id),
            LedgerError::InvalidProduct(reason) => InventoryError::InvalidProduct(reason),
            LedgerError::InvalidQuantity(quantity) => InventoryError::InvalidQuantity(quantity),
            other => InventoryError::TransactionFailure(other),
        }
    }
}

impl From<CoordinationError> for InventoryError {
    fn from(err: CoordinationError) -> Self {
        match err {
            CoordinationError::LockUnavailable { key, .. } => {
                InventoryError::LockUnavailable { key }
            }
            other => InventoryError::Coordination(other),
        }
    }
}

/// Convenience type alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;
