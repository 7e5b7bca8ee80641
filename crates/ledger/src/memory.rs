use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::{
    EventSummary, LedgerStore, OrderQuantities, ReserveOutcome, Transition, hold_created_metadata,
    hold_released_metadata, order_confirmed_metadata, validate_new_product,
};
use crate::{
    CustomerId, InventoryEvent, InventoryEventType, LedgerError, NewHold, NewProduct, Order,
    OrderId, OrderStatus, Product, ProductId, ReleaseReason, Result,
};

#[derive(Debug, Default)]
struct LedgerState {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    events: Vec<InventoryEvent>,
    next_product_id: i64,
    next_order_id: i64,
    failing_orders: HashSet<OrderId>,
}

impl LedgerState {
    fn append_event(
        &mut self,
        product_id: ProductId,
        event_type: InventoryEventType,
        delta: i64,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let id = self.events.len() as i64 + 1;
        self.events.push(InventoryEvent {
            id,
            product_id,
            event_type,
            delta,
            metadata,
            created_at: now,
        });
    }

    fn check_injected_failure(&self, order_id: OrderId) -> Result<()> {
        if self.failing_orders.contains(&order_id) {
            return Err(LedgerError::Unavailable(format!(
                "transaction for order {order_id} aborted"
            )));
        }
        Ok(())
    }
}

/// In-memory ledger store for testing and single-process deployments.
///
/// A single write lock stands in for the database transaction: every
/// write method holds it for its whole read-check-write sequence, which
/// gives the same all-or-nothing and row-serialization guarantees the
/// PostgreSQL implementation gets from `FOR UPDATE` and conditional updates.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every status transition for `order_id` fail as if the
    /// database aborted the transaction.
    pub async fn fail_transitions_for(&self, order_id: OrderId) {
        self.state.write().await.failing_orders.insert(order_id);
    }

    /// Removes all injected failures.
    pub async fn clear_failures(&self) {
        self.state.write().await.failing_orders.clear();
    }

    /// Returns the total number of inventory events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_product(&self, product: NewProduct, now: DateTime<Utc>) -> Result<Product> {
        validate_new_product(&product)?;

        let mut state = self.state.write().await;
        state.next_product_id += 1;
        let product = Product {
            id: ProductId::new(state.next_product_id),
            name: product.name,
            description: product.description,
            price_cents: product.price_cents,
            total_stock: product.initial_stock,
            sale_starts_at: product.sale_starts_at,
            sale_ends_at: product.sale_ends_at,
            created_at: now,
        };
        state.products.insert(product.id, product.clone());
        state.append_event(
            product.id,
            InventoryEventType::StockAdded,
            product.total_stock,
            serde_json::json!({ "reason": "initial_stock" }),
            now,
        );

        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn reserve_stock(&self, hold: NewHold) -> Result<ReserveOutcome> {
        if hold.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(hold.quantity));
        }

        let mut state = self.state.write().await;
        match state.products.get_mut(&hold.product_id) {
            Some(product) if product.total_stock >= hold.quantity => {
                product.total_stock -= hold.quantity;
            }
            _ => return Ok(ReserveOutcome::InsufficientStock),
        }

        state.next_order_id += 1;
        let order = Order {
            id: OrderId::new(state.next_order_id),
            product_id: hold.product_id,
            customer_id: hold.customer_id,
            quantity: hold.quantity,
            status: OrderStatus::Pending,
            hold_expires_at: hold.hold_expires_at,
            created_at: hold.created_at,
        };
        state.orders.insert(order.id, order.clone());
        state.append_event(
            order.product_id,
            InventoryEventType::HoldCreated,
            -order.quantity,
            hold_created_metadata(&order),
            hold.created_at,
        );

        Ok(ReserveOutcome::Reserved(order))
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn find_order_for_customer(
        &self,
        order_id: OrderId,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .get(&order_id)
            .filter(|o| &o.customer_id == customer_id)
            .cloned())
    }

    async fn list_orders_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| &o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn confirm_pending(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Transition> {
        let mut state = self.state.write().await;
        state.check_injected_failure(order_id)?;

        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(Transition::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(Transition::NotPending(order.status));
        }
        if order.is_lapsed(now) {
            return Ok(Transition::Lapsed);
        }

        order.status = OrderStatus::Confirmed;
        let order = order.clone();
        state.append_event(
            order.product_id,
            InventoryEventType::OrderConfirmed,
            0,
            order_confirmed_metadata(&order),
            now,
        );

        Ok(Transition::Applied(order))
    }

    async fn expire_pending(
        &self,
        order_id: OrderId,
        reason: ReleaseReason,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let mut state = self.state.write().await;
        state.check_injected_failure(order_id)?;

        let Some(current) = state.orders.get(&order_id).cloned() else {
            return Ok(Transition::NotFound);
        };
        if current.status != OrderStatus::Pending {
            return Ok(Transition::NotPending(current.status));
        }

        let product = state
            .products
            .get_mut(&current.product_id)
            .ok_or(LedgerError::ProductNotFound(current.product_id))?;
        product.total_stock += current.quantity;

        let expired = Order {
            status: OrderStatus::Expired,
            ..current
        };
        state.orders.insert(order_id, expired.clone());
        state.append_event(
            expired.product_id,
            InventoryEventType::HoldReleased,
            expired.quantity,
            hold_released_metadata(&expired, reason),
            now,
        );

        Ok(Transition::Applied(expired))
    }

    async fn find_lapsed_holds(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.hold_expires_at <= now)
            .cloned()
            .collect())
    }

    async fn order_quantities(&self) -> Result<Vec<OrderQuantities>> {
        let state = self.state.read().await;
        let mut grouped: HashMap<(ProductId, OrderStatus), (i64, i64)> = HashMap::new();
        for order in state.orders.values() {
            let entry = grouped.entry((order.product_id, order.status)).or_default();
            entry.0 += 1;
            entry.1 += order.quantity;
        }

        let mut rows: Vec<_> = grouped
            .into_iter()
            .map(|((product_id, status), (count, quantity))| OrderQuantities {
                product_id,
                status,
                count,
                quantity,
            })
            .collect();
        rows.sort_by_key(|r| (r.product_id, r.status.as_str()));
        Ok(rows)
    }

    async fn event_summary(&self) -> Result<Vec<EventSummary>> {
        let state = self.state.read().await;
        let mut grouped: HashMap<InventoryEventType, (i64, i64)> = HashMap::new();
        for event in &state.events {
            let entry = grouped.entry(event.event_type).or_default();
            entry.0 += 1;
            entry.1 += event.delta;
        }

        let mut rows: Vec<_> = grouped
            .into_iter()
            .map(|(event_type, (count, total_delta))| EventSummary {
                event_type,
                count,
                total_delta,
            })
            .collect();
        rows.sort_by_key(|r| r.event_type.as_str());
        Ok(rows)
    }

    async fn events_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect())
    }
}
