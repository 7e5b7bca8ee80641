use thiserror::Error;

use crate::ProductId;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The product referenced by a write does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Catalog input that would break the stock invariants.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// A hold asked for a non-positive quantity.
    #[error("Invalid hold quantity: {0}")]
    InvalidQuantity(i64),

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// The store refused the transaction (injected failure, shutdown, ...).
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
