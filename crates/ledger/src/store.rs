use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    CustomerId, InventoryEvent, InventoryEventType, NewHold, NewProduct, Order, OrderId,
    OrderStatus, Product, ProductId, ReleaseReason, Result,
};

/// Result of the conditional stock decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented and the pending order plus its
    /// `hold_created` event were committed together.
    Reserved(Order),
    /// The conditional update matched no row; nothing was written.
    InsufficientStock,
}

/// Result of a status transition attempted under the order's row lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The order was still pending and the transition was committed.
    Applied(Order),
    /// The order had already left `pending`; nothing was written.
    NotPending(OrderStatus),
    /// A confirm found the hold lapsed under the lock; nothing was written.
    Lapsed,
    /// No order with that id exists.
    NotFound,
}

/// Count and summed quantity of orders for one (product, status) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderQuantities {
    pub product_id: ProductId,
    pub status: OrderStatus,
    pub count: i64,
    pub quantity: i64,
}

/// Count and summed delta of inventory events of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub event_type: InventoryEventType,
    pub count: i64,
    pub total_delta: i64,
}

/// Core trait for ledger store implementations.
///
/// Every write method is a single atomic transaction: either all of its
/// row changes and audit events are committed, or none are. Status
/// transitions lock the order row before re-reading its status, so two
/// callers racing on the same order observe `pending` at most once.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a product and its opening `stock_added` event.
    async fn insert_product(&self, product: NewProduct, now: DateTime<Utc>) -> Result<Product>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Decrements stock by `hold.quantity` only if enough stock remains,
    /// then records the pending order and its `hold_created` event.
    ///
    /// This conditional update is the authoritative oversell guard and
    /// must hold without any external lock.
    async fn reserve_stock(&self, hold: NewHold) -> Result<ReserveOutcome>;

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order only if it belongs to `customer_id`.
    async fn find_order_for_customer(
        &self,
        order_id: OrderId,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>>;

    /// Lists a customer's orders, newest first.
    async fn list_orders_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>>;

    /// Moves a pending, unlapsed order to `confirmed` and appends an
    /// `order_confirmed` event with a zero delta.
    async fn confirm_pending(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Transition>;

    /// Moves a pending order to `expired`, restocks its quantity and
    /// appends a `hold_released` event carrying `reason`.
    async fn expire_pending(
        &self,
        order_id: OrderId,
        reason: ReleaseReason,
        now: DateTime<Utc>,
    ) -> Result<Transition>;

    /// Pending orders whose `hold_expires_at <= now`.
    async fn find_lapsed_holds(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Order counts and quantities grouped by product and status.
    async fn order_quantities(&self) -> Result<Vec<OrderQuantities>>;

    /// Event counts and delta sums grouped by type.
    async fn event_summary(&self) -> Result<Vec<EventSummary>>;

    /// All events for a product in creation order.
    async fn events_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryEvent>>;
}

/// Builds the metadata recorded with a `hold_created` event.
pub(crate) fn hold_created_metadata(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "order_id": order.id.as_i64(),
        "customer_id": order.customer_id.as_str(),
    })
}

/// Builds the metadata recorded with a `hold_released` event.
pub(crate) fn hold_released_metadata(order: &Order, reason: ReleaseReason) -> serde_json::Value {
    serde_json::json!({
        "order_id": order.id.as_i64(),
        "reason": reason.as_str(),
    })
}

/// Builds the metadata recorded with an `order_confirmed` event.
pub(crate) fn order_confirmed_metadata(order: &Order) -> serde_json::Value {
    serde_json::json!({ "order_id": order.id.as_i64() })
}

/// Rejects catalog input that would violate the stock invariants.
pub(crate) fn validate_new_product(product: &NewProduct) -> Result<()> {
    if product.initial_stock < 0 {
        return Err(crate::LedgerError::InvalidProduct(format!(
            "initial stock {} is negative",
            product.initial_stock
        )));
    }
    if product.sale_ends_at < product.sale_starts_at {
        return Err(crate::LedgerError::InvalidProduct(
            "sale ends before it starts".to_string(),
        ));
    }
    Ok(())
}
