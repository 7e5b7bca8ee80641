//! Stock hold creation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use coordination::{CoordinationLock, CoordinationLockExt, Counter, LockToken};
use ledger::{LedgerStore, NewHold, ReserveOutcome};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::InventoryConfig;
use crate::error::{InventoryError, Result};

/// Returned to the customer when a hold is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HoldReceipt {
    pub order_id: OrderId,
    pub hold_expires_at: DateTime<Utc>,
}

/// Places time-limited holds on product stock.
///
/// The per-product lock only thins out contention; the ledger's conditional
/// decrement is what actually prevents overselling, so a lease that runs
/// out mid-reservation cannot drive stock negative.
#[derive(Clone)]
pub struct HoldManager<S: LedgerStore> {
    store: S,
    lock: Arc<dyn CoordinationLock>,
    oversell_counter: Arc<dyn Counter>,
    clock: Arc<dyn Clock>,
    config: InventoryConfig,
}

impl<S: LedgerStore> HoldManager<S> {
    pub fn new(
        store: S,
        lock: Arc<dyn CoordinationLock>,
        oversell_counter: Arc<dyn Counter>,
        clock: Arc<dyn Clock>,
        config: InventoryConfig,
    ) -> Self {
        Self {
            store,
            lock,
            oversell_counter,
            clock,
            config,
        }
    }

    /// Reserves `quantity` units of a live product for `customer_id`.
    ///
    /// On success the stock is already decremented and a pending order
    /// exists that expires `hold_ttl` from now.
    #[tracing::instrument(skip(self, customer_id), fields(customer_id = %customer_id))]
    pub async fn create_hold(
        &self,
        product_id: ProductId,
        quantity: i64,
        customer_id: &CustomerId,
    ) -> Result<HoldReceipt> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(product_id))?;
        if !product.is_sale_live(self.clock.now()) {
            return Err(InventoryError::SaleNotActive(product_id));
        }

        let key = product_id.lock_key();
        let token = self
            .lock
            .acquire(&key, self.config.lock_lease, self.config.lock_timeout)
            .await?;

        let result = self.reserve(product_id, quantity, customer_id).await;
        self.release(&key, &token).await;
        result
    }

    async fn reserve(
        &self,
        product_id: ProductId,
        quantity: i64,
        customer_id: &CustomerId,
    ) -> Result<HoldReceipt> {
        let now = self.clock.now();
        let hold = NewHold {
            product_id,
            customer_id: customer_id.clone(),
            quantity,
            hold_expires_at: now + self.config.hold_ttl_delta(),
            created_at: now,
        };

        match self.store.reserve_stock(hold).await? {
            ReserveOutcome::Reserved(order) => {
                metrics::counter!("holds_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    hold_expires_at = %order.hold_expires_at,
                    "hold created"
                );
                Ok(HoldReceipt {
                    order_id: order.id,
                    hold_expires_at: order.hold_expires_at,
                })
            }
            ReserveOutcome::InsufficientStock => {
                match self.oversell_counter.increment().await {
                    Ok(blocked_total) => {
                        tracing::warn!(blocked_total, "oversell attempt blocked");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to record blocked oversell attempt");
                    }
                }
                Err(InventoryError::InsufficientStock {
                    product_id,
                    requested: quantity,
                })
            }
        }
    }

    async fn release(&self, key: &str, token: &LockToken) {
        match self.lock.release(key, token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(key, "lock lease expired before release"),
            Err(e) => tracing::error!(key, error = %e, "failed to release lock"),
        }
    }
}
