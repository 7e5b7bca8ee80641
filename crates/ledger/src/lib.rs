pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{CustomerId, OrderId, ProductId};
pub use error::{LedgerError, Result};
pub use memory::InMemoryLedgerStore;
pub use model::{
    InventoryEvent, InventoryEventType, NewHold, NewProduct, Order, OrderStatus, Product,
    ReleaseReason,
};
pub use postgres::PostgresLedgerStore;
pub use store::{EventSummary, LedgerStore, OrderQuantities, ReserveOutcome, Transition};
