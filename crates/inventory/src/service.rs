//! Service facade over the hold lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use coordination::{CoordinationLock, Counter};
use ledger::{LedgerStore, NewProduct, Order, OrderStatus, Product};
use serde::Serialize;

use crate::catalog;
use crate::clock::Clock;
use crate::config::InventoryConfig;
use crate::confirm::{ConfirmOutcome, ConfirmationHandler};
use crate::error::{InventoryError, Result};
use crate::hold::{HoldManager, HoldReceipt};
use crate::reconciler::ExpiryReconciler;
use crate::reports::Reports;

/// An order joined with its product for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub price_cents: Option<i64>,
    pub quantity: i64,
    pub status: OrderStatus,
    pub hold_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OrderView {
    fn new(order: Order, product: Option<&Product>) -> Self {
        Self {
            id: order.id,
            product_id: order.product_id,
            product_name: product.map(|p| p.name.clone()),
            price_cents: product.map(|p| p.price_cents),
            quantity: order.quantity,
            status: order.status,
            hold_expires_at: order.hold_expires_at,
            created_at: order.created_at,
        }
    }
}

/// Entry point for every flash-sale operation.
///
/// Wires one ledger store, lock, counter and clock into the hold manager,
/// confirmation handler, reconciler and reports so they all observe the
/// same state.
#[derive(Clone)]
pub struct FlashSaleService<S: LedgerStore> {
    store: S,
    clock: Arc<dyn Clock>,
    holds: HoldManager<S>,
    confirmations: ConfirmationHandler<S>,
    reconciler: ExpiryReconciler<S>,
    reports: Reports<S>,
}

impl<S: LedgerStore + Clone + 'static> FlashSaleService<S> {
    pub fn new(
        store: S,
        lock: Arc<dyn CoordinationLock>,
        oversell_counter: Arc<dyn Counter>,
        clock: Arc<dyn Clock>,
        config: InventoryConfig,
    ) -> Self {
        Self {
            holds: HoldManager::new(
                store.clone(),
                lock,
                oversell_counter.clone(),
                clock.clone(),
                config,
            ),
            confirmations: ConfirmationHandler::new(store.clone(), clock.clone()),
            reconciler: ExpiryReconciler::new(store.clone(), clock.clone(), config.sweep_interval),
            reports: Reports::new(store.clone(), oversell_counter, clock.clone()),
            store,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn reconciler(&self) -> &ExpiryReconciler<S> {
        &self.reconciler
    }

    pub fn reports(&self) -> &Reports<S> {
        &self.reports
    }

    /// See [`HoldManager::create_hold`].
    pub async fn create_hold(
        &self,
        product_id: ProductId,
        quantity: i64,
        customer_id: &CustomerId,
    ) -> Result<HoldReceipt> {
        self.holds.create_hold(product_id, quantity, customer_id).await
    }

    /// See [`ConfirmationHandler::confirm_order`].
    pub async fn confirm_order(
        &self,
        order_id: OrderId,
        customer_id: &CustomerId,
    ) -> Result<ConfirmOutcome> {
        self.confirmations.confirm_order(order_id, customer_id).await
    }

    /// The customer's orders, newest first.
    pub async fn list_orders(&self, customer_id: &CustomerId) -> Result<Vec<OrderView>> {
        let orders = self.store.list_orders_for_customer(customer_id).await?;
        let products: HashMap<ProductId, Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(orders
            .into_iter()
            .map(|order| {
                let product = products.get(&order.product_id);
                OrderView::new(order, product)
            })
            .collect())
    }

    /// One order, only if it belongs to `customer_id`.
    pub async fn get_order(&self, order_id: OrderId, customer_id: &CustomerId) -> Result<OrderView> {
        let order = self
            .store
            .find_order_for_customer(order_id, customer_id)
            .await?
            .ok_or(InventoryError::OrderNotFound(order_id))?;
        let product = self.store.get_product(order.product_id).await?;
        Ok(OrderView::new(order, product.as_ref()))
    }

    /// Adds a product together with its opening `stock_added` event.
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add_product(&self, product: NewProduct) -> Result<Product> {
        let product = self.store.insert_product(product, self.clock.now()).await?;
        tracing::info!(product_id = %product.id, stock = product.total_stock, "product added");
        Ok(product)
    }

    /// Inserts the demo catalog if the store has no products yet.
    ///
    /// Returns how many products were added.
    pub async fn seed_demo_catalog(&self) -> Result<usize> {
        if !self.store.list_products().await?.is_empty() {
            return Ok(0);
        }

        let products = catalog::demo_products(self.clock.now());
        let count = products.len();
        for product in products {
            self.add_product(product).await?;
        }
        tracing::info!(count, "demo catalog seeded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use coordination::{AtomicCounter, InMemoryLock};
    use ledger::InMemoryLedgerStore;

    use super::*;
    use crate::clock::ManualClock;

    fn service() -> FlashSaleService<InMemoryLedgerStore> {
        FlashSaleService::new(
            InMemoryLedgerStore::new(),
            Arc::new(InMemoryLock::new()),
            Arc::new(AtomicCounter::oversell_blocked()),
            Arc::new(ManualClock::new(Utc::now())),
            InventoryConfig::default(),
        )
    }

    #[tokio::test]
    async fn seeding_is_skipped_when_catalog_exists() {
        let service = service();
        assert_eq!(service.seed_demo_catalog().await.unwrap(), 6);
        assert_eq!(service.seed_demo_catalog().await.unwrap(), 0);
        assert_eq!(service.store().list_products().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn orders_are_scoped_and_joined_with_product() {
        let service = service();
        service.seed_demo_catalog().await.unwrap();
        let alice = CustomerId::from("alice");
        let bob = CustomerId::from("bob");

        let first = service.create_hold(ProductId::new(1), 1, &alice).await.unwrap();
        let second = service.create_hold(ProductId::new(2), 2, &alice).await.unwrap();
        service.create_hold(ProductId::new(1), 1, &bob).await.unwrap();

        let orders = service.list_orders(&alice).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, second.order_id);
        assert_eq!(orders[0].product_name.as_deref(), Some("Pro Headphones"));
        assert_eq!(orders[1].id, first.order_id);

        let view = service.get_order(first.order_id, &alice).await.unwrap();
        assert_eq!(view.price_cents, Some(9999));
        assert_eq!(view.status, OrderStatus::Pending);

        let err = service.get_order(first.order_id, &bob).await;
        assert!(matches!(err, Err(InventoryError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn add_product_rejects_inverted_window() {
        let service = service();
        let now = Utc::now();
        let err = service
            .add_product(NewProduct {
                name: "Broken".to_string(),
                description: None,
                price_cents: 100,
                initial_stock: 1,
                sale_starts_at: now,
                sale_ends_at: now - Duration::hours(1),
            })
            .await;
        assert!(matches!(err, Err(InventoryError::InvalidProduct(_))));
    }
}
