//! Read-side views computed from products, order aggregates and the ledger.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::ProductId;
use coordination::Counter;
use ledger::{EventSummary, LedgerStore, OrderQuantities, OrderStatus, Product};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{InventoryError, Result};

/// Stock position of one product as shown to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductAvailability {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// Units still available to new holds.
    pub live_stock: i64,
    /// Quantity under pending holds.
    pub holds: i64,
    /// Quantity in confirmed orders.
    pub confirmed: i64,
    /// `(holds + confirmed) / (live_stock + holds + confirmed)`, rounded.
    pub percent_sold: i64,
    pub sale_starts_at: DateTime<Utc>,
    pub sale_ends_at: DateTime<Utc>,
    pub sale_active: bool,
    /// Whole seconds until the sale ends, never negative.
    pub countdown_seconds: i64,
}

/// Per-product quantities by order status, for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub total_stock: i64,
    pub pending_qty: i64,
    pub confirmed_qty: i64,
    pub expired_qty: i64,
    pub sale_active: bool,
}

/// Order count and summed quantity for one status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub count: i64,
    pub quantity: i64,
}

/// System-wide inventory figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryMetrics {
    pub total_products: usize,
    /// Sum of live stock across all products.
    pub total_stock: i64,
    pub pending_holds: StatusTotals,
    pub confirmed_orders: StatusTotals,
    pub expired_orders: StatusTotals,
    pub oversell_attempts_blocked: u64,
    pub inventory_events_summary: Vec<EventSummary>,
}

/// Result of replaying one product's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub product_id: ProductId,
    pub event_count: usize,
    /// Sum of every event delta in creation order.
    pub replayed_stock: i64,
    pub total_stock: i64,
    pub consistent: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct QuantityByStatus {
    pending: i64,
    confirmed: i64,
    expired: i64,
}

fn quantities_by_product(rows: &[OrderQuantities]) -> HashMap<ProductId, QuantityByStatus> {
    let mut map: HashMap<ProductId, QuantityByStatus> = HashMap::new();
    for row in rows {
        let entry = map.entry(row.product_id).or_default();
        match row.status {
            OrderStatus::Pending => entry.pending += row.quantity,
            OrderStatus::Confirmed => entry.confirmed += row.quantity,
            OrderStatus::Expired => entry.expired += row.quantity,
            OrderStatus::Cancelled => {}
        }
    }
    map
}

fn percent_sold(live_stock: i64, sold: i64) -> i64 {
    let initial = live_stock + sold;
    if initial <= 0 {
        return 0;
    }
    (sold * 100 + initial / 2) / initial
}

fn availability(product: Product, stats: QuantityByStatus, now: DateTime<Utc>) -> ProductAvailability {
    let sold = stats.pending + stats.confirmed;
    ProductAvailability {
        sale_active: product.is_sale_live(now),
        countdown_seconds: (product.sale_ends_at - now).num_seconds().max(0),
        percent_sold: percent_sold(product.total_stock, sold),
        id: product.id,
        name: product.name,
        description: product.description,
        price_cents: product.price_cents,
        live_stock: product.total_stock,
        holds: stats.pending,
        confirmed: stats.confirmed,
        sale_starts_at: product.sale_starts_at,
        sale_ends_at: product.sale_ends_at,
    }
}

/// Builds the shopper and operator views.
#[derive(Clone)]
pub struct Reports<S: LedgerStore> {
    store: S,
    oversell_counter: Arc<dyn Counter>,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore> Reports<S> {
    pub fn new(store: S, oversell_counter: Arc<dyn Counter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            oversell_counter,
            clock,
        }
    }

    /// Products whose sale window contains now, ordered by id.
    pub async fn live_products(&self) -> Result<Vec<ProductAvailability>> {
        let now = self.clock.now();
        let products: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| p.is_sale_live(now))
            .collect();
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let stats = quantities_by_product(&self.store.order_quantities().await?);
        Ok(products
            .into_iter()
            .map(|p| {
                let s = stats.get(&p.id).copied().unwrap_or_default();
                availability(p, s, now)
            })
            .collect())
    }

    /// Stock position of one product, live or not.
    pub async fn live_stock(&self, product_id: ProductId) -> Result<ProductAvailability> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(product_id))?;
        let stats = quantities_by_product(&self.store.order_quantities().await?);
        let s = stats.get(&product_id).copied().unwrap_or_default();
        Ok(availability(product, s, self.clock.now()))
    }

    /// Every product with its pending, confirmed and expired quantities.
    pub async fn product_snapshot(&self) -> Result<Vec<ProductSnapshot>> {
        let now = self.clock.now();
        let products = self.store.list_products().await?;
        let stats = quantities_by_product(&self.store.order_quantities().await?);

        Ok(products
            .into_iter()
            .map(|p| {
                let s = stats.get(&p.id).copied().unwrap_or_default();
                ProductSnapshot {
                    sale_active: p.is_sale_live(now),
                    id: p.id,
                    name: p.name,
                    total_stock: p.total_stock,
                    pending_qty: s.pending,
                    confirmed_qty: s.confirmed,
                    expired_qty: s.expired,
                }
            })
            .collect())
    }

    /// Catalog totals, order totals per status, the blocked-oversell counter
    /// and the ledger summary per event type.
    pub async fn inventory_metrics(&self) -> Result<InventoryMetrics> {
        let products = self.store.list_products().await?;
        let quantities = self.store.order_quantities().await?;
        let inventory_events_summary = self.store.event_summary().await?;
        let oversell_attempts_blocked = self.oversell_counter.value().await?;

        let mut totals: HashMap<OrderStatus, StatusTotals> = HashMap::new();
        for row in &quantities {
            let entry = totals.entry(row.status).or_default();
            entry.count += row.count;
            entry.quantity += row.quantity;
        }
        let of = |status| totals.get(&status).copied().unwrap_or_default();

        Ok(InventoryMetrics {
            total_products: products.len(),
            total_stock: products.iter().map(|p| p.total_stock).sum(),
            pending_holds: of(OrderStatus::Pending),
            confirmed_orders: of(OrderStatus::Confirmed),
            expired_orders: of(OrderStatus::Expired),
            oversell_attempts_blocked,
            inventory_events_summary,
        })
    }

    /// Replays a product's events and checks the sum against its stock.
    #[tracing::instrument(skip(self))]
    pub async fn audit_product(&self, product_id: ProductId) -> Result<AuditReport> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(product_id))?;
        let events = self.store.events_for_product(product_id).await?;
        let replayed_stock = events.iter().map(|e| e.delta).sum();

        let report = AuditReport {
            product_id,
            event_count: events.len(),
            replayed_stock,
            total_stock: product.total_stock,
            consistent: replayed_stock == product.total_stock,
        };
        if !report.consistent {
            tracing::error!(
                replayed_stock,
                total_stock = product.total_stock,
                "ledger replay disagrees with product stock"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_sold_rounds_half_up() {
        assert_eq!(percent_sold(0, 0), 0);
        assert_eq!(percent_sold(100, 0), 0);
        assert_eq!(percent_sold(0, 30), 100);
        assert_eq!(percent_sold(2, 1), 33);
        assert_eq!(percent_sold(1, 2), 67);
        assert_eq!(percent_sold(199, 1), 1);
    }

    #[test]
    fn quantities_are_split_by_status() {
        let p1 = ProductId::new(1);
        let p2 = ProductId::new(2);
        let row = |product_id, status, count, quantity| OrderQuantities {
            product_id,
            status,
            count,
            quantity,
        };
        let map = quantities_by_product(&[
            row(p1, OrderStatus::Pending, 2, 3),
            row(p1, OrderStatus::Confirmed, 1, 4),
            row(p1, OrderStatus::Expired, 1, 1),
            row(p2, OrderStatus::Cancelled, 1, 9),
        ]);

        let s = map[&p1];
        assert_eq!((s.pending, s.confirmed, s.expired), (3, 4, 1));
        let s = map[&p2];
        assert_eq!((s.pending, s.confirmed, s.expired), (0, 0, 0));
    }
}
