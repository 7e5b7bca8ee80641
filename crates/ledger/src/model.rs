//! Rows held by the ledger: products, orders (holds) and inventory events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, LedgerError, OrderId, ProductId};

/// A flash-sale product.
///
/// `total_stock` is the live number of units still available to new holds,
/// not the quantity the sale started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub total_stock: i64,
    pub sale_starts_at: DateTime<Utc>,
    pub sale_ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if the sale window contains `now` (both ends inclusive).
    pub fn is_sale_live(&self, now: DateTime<Utc>) -> bool {
        self.sale_starts_at <= now && now <= self.sale_ends_at
    }
}

/// Catalog input for a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub initial_stock: i64,
    pub sale_starts_at: DateTime<Utc>,
    pub sale_ends_at: DateTime<Utc>,
}

/// Status of an order in its hold lifecycle.
///
/// ```text
/// Pending ──┬──► Confirmed
///           └──► Expired
/// Cancelled is reserved and never produced by the hold flows.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Expired => "expired",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "expired" => Ok(OrderStatus::Expired),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(LedgerError::CorruptRow {
                table: "orders",
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// An order: a stock hold that is later confirmed or expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub customer_id: CustomerId,
    pub quantity: i64,
    pub status: OrderStatus,
    pub hold_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Returns true once the hold TTL has strictly passed.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        now > self.hold_expires_at
    }
}

/// Input for the atomic reserve-and-record write.
#[derive(Debug, Clone)]
pub struct NewHold {
    pub product_id: ProductId,
    pub customer_id: CustomerId,
    pub quantity: i64,
    pub hold_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Kind of stock movement recorded in the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryEventType {
    StockAdded,
    HoldCreated,
    HoldReleased,
    OrderConfirmed,
}

impl InventoryEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryEventType::StockAdded => "stock_added",
            InventoryEventType::HoldCreated => "hold_created",
            InventoryEventType::HoldReleased => "hold_released",
            InventoryEventType::OrderConfirmed => "order_confirmed",
        }
    }
}

impl std::fmt::Display for InventoryEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InventoryEventType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock_added" => Ok(InventoryEventType::StockAdded),
            "hold_created" => Ok(InventoryEventType::HoldCreated),
            "hold_released" => Ok(InventoryEventType::HoldReleased),
            "order_confirmed" => Ok(InventoryEventType::OrderConfirmed),
            other => Err(LedgerError::CorruptRow {
                table: "inventory_events",
                reason: format!("unknown event type '{other}'"),
            }),
        }
    }
}

/// Why a hold's stock went back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// A confirm attempt found the hold already lapsed.
    ExpiredOnConfirm,
    /// The background sweep found the hold lapsed.
    WorkerExpired,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::ExpiredOnConfirm => "expired_on_confirm",
            ReleaseReason::WorkerExpired => "worker_expired",
        }
    }
}

impl std::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of a stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub id: i64,
    pub product_id: ProductId,
    pub event_type: InventoryEventType,
    /// Signed change applied to `Product::total_stock`.
    pub delta: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl InventoryEvent {
    /// Order referenced by the event metadata, if any.
    pub fn order_id(&self) -> Option<OrderId> {
        self.metadata
            .get("order_id")
            .and_then(serde_json::Value::as_i64)
            .map(OrderId::new)
    }

    /// Release reason recorded in the metadata, for `hold_released` events.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn product_with_window(starts: DateTime<Utc>, ends: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Widget".to_string(),
            description: None,
            price_cents: 999,
            total_stock: 10,
            sale_starts_at: starts,
            sale_ends_at: ends,
            created_at: starts,
        }
    }

    #[test]
    fn sale_window_is_inclusive() {
        let now = Utc::now();
        let product = product_with_window(now, now + Duration::minutes(5));
        assert!(product.is_sale_live(now));
        assert!(product.is_sale_live(now + Duration::minutes(5)));
        assert!(!product.is_sale_live(now - Duration::seconds(1)));
        assert!(!product.is_sale_live(now + Duration::minutes(5) + Duration::seconds(1)));
    }

    #[test]
    fn status_parses_its_own_representation() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Expired,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!(matches!(
            "refunded".parse::<OrderStatus>(),
            Err(LedgerError::CorruptRow { table: "orders", .. })
        ));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Confirmed.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn hold_lapses_strictly_after_expiry() {
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(1),
            product_id: ProductId::new(1),
            customer_id: CustomerId::new("a@example.com"),
            quantity: 1,
            status: OrderStatus::Pending,
            hold_expires_at: now,
            created_at: now - Duration::seconds(120),
        };
        assert!(!order.is_lapsed(now));
        assert!(order.is_lapsed(now + Duration::milliseconds(1)));
    }

    #[test]
    fn event_metadata_accessors() {
        let event = InventoryEvent {
            id: 1,
            product_id: ProductId::new(3),
            event_type: InventoryEventType::HoldReleased,
            delta: 2,
            metadata: serde_json::json!({"order_id": 9, "reason": "worker_expired"}),
            created_at: Utc::now(),
        };
        assert_eq!(event.order_id(), Some(OrderId::new(9)));
        assert_eq!(event.reason(), Some(ReleaseReason::WorkerExpired.as_str()));
    }
}
