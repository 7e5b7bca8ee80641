//! Flash-sale hold lifecycle.
//!
//! A hold reserves stock for a short TTL under a per-product coordination
//! lock and the ledger's conditional decrement. The holder then confirms it,
//! or it lapses and its stock returns to the pool, either lazily on a late
//! confirm or through the background [`ExpiryReconciler`].
//!
//! ```text
//! create_hold ──► pending ──┬── confirm_order ──► confirmed
//!                           ├── late confirm  ──► expired (+stock)
//!                           └── sweep         ──► expired (+stock)
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod confirm;
pub mod error;
pub mod hold;
pub mod reconciler;
pub mod reports;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::InventoryConfig;
pub use confirm::{ConfirmOutcome, ConfirmationHandler};
pub use error::{InventoryError, Result};
pub use hold::{HoldManager, HoldReceipt};
pub use reconciler::{ExpiryReconciler, SweepReport};
pub use reports::{
    AuditReport, InventoryMetrics, ProductAvailability, ProductSnapshot, Reports, StatusTotals,
};
pub use service::{FlashSaleService, OrderView};
