//! Hold confirmation with lazy expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use ledger::{LedgerStore, OrderStatus, ReleaseReason, Transition};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{InventoryError, Result};

/// Successful result of a confirm request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// This call moved the order to `confirmed`.
    Confirmed,
    /// The order had been confirmed earlier; nothing was written.
    AlreadyConfirmed,
}

impl ConfirmOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmOutcome::Confirmed => "confirmed",
            ConfirmOutcome::AlreadyConfirmed => "already_confirmed",
        }
    }
}

/// Converts pending holds into confirmed orders.
///
/// A confirm that finds the hold lapsed releases it on the spot instead of
/// waiting for the next sweep, then reports `HoldExpired`.
#[derive(Clone)]
pub struct ConfirmationHandler<S: LedgerStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStore> ConfirmationHandler<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Confirms `order_id` on behalf of its owner.
    ///
    /// Repeating the call on a confirmed order returns
    /// [`ConfirmOutcome::AlreadyConfirmed`] without any side effect. An order
    /// already expired or cancelled when loaded is `OrderNotConfirmable`;
    /// `HoldExpired` only follows a release this call performed or lost to
    /// under the row lock.
    #[tracing::instrument(skip(self, customer_id), fields(customer_id = %customer_id))]
    pub async fn confirm_order(
        &self,
        order_id: OrderId,
        customer_id: &CustomerId,
    ) -> Result<ConfirmOutcome> {
        let order = self
            .store
            .find_order_for_customer(order_id, customer_id)
            .await?
            .ok_or(InventoryError::OrderNotFound(order_id))?;

        if order.status == OrderStatus::Confirmed {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }
        if order.status.is_terminal() {
            return Err(InventoryError::OrderNotConfirmable {
                order_id,
                status: order.status,
            });
        }

        let now = self.clock.now();
        if order.is_lapsed(now) {
            return self.expire_lapsed(order_id, now).await;
        }

        match self.store.confirm_pending(order_id, now).await? {
            Transition::Applied(order) => {
                metrics::counter!("orders_confirmed_total").increment(1);
                tracing::info!(
                    product_id = %order.product_id,
                    quantity = order.quantity,
                    "order confirmed"
                );
                Ok(ConfirmOutcome::Confirmed)
            }
            Transition::Lapsed => self.expire_lapsed(order_id, now).await,
            Transition::NotPending(status) => Self::settled(order_id, status),
            Transition::NotFound => Err(InventoryError::OrderNotFound(order_id)),
        }
    }

    async fn expire_lapsed(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<ConfirmOutcome> {
        match self
            .store
            .expire_pending(order_id, ReleaseReason::ExpiredOnConfirm, now)
            .await?
        {
            Transition::Applied(order) => {
                metrics::counter!("holds_expired_total", "path" => "confirm").increment(1);
                tracing::info!(
                    product_id = %order.product_id,
                    restocked = order.quantity,
                    "lapsed hold released on confirm"
                );
                Err(InventoryError::HoldExpired(order_id))
            }
            Transition::NotPending(status) => Self::settled(order_id, status),
            // expire_pending never reports a lapse.
            Transition::Lapsed | Transition::NotFound => {
                Err(InventoryError::OrderNotFound(order_id))
            }
        }
    }

    /// Maps a status some concurrent caller already settled.
    fn settled(order_id: OrderId, status: OrderStatus) -> Result<ConfirmOutcome> {
        match status {
            OrderStatus::Confirmed => Ok(ConfirmOutcome::AlreadyConfirmed),
            OrderStatus::Expired => Err(InventoryError::HoldExpired(order_id)),
            status => Err(InventoryError::OrderNotConfirmable { order_id, status }),
        }
    }
}
