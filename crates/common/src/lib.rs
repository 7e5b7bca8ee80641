//! Shared identifier types used across the flash-sale crates.

pub mod types;

pub use types::{CustomerId, OrderId, ProductId};
