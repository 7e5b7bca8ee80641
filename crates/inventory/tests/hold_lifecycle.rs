//! Integration tests for the hold lifecycle.
//!
//! These drive the full service against the in-memory ledger, lock and
//! counter, with a manual clock standing in for wall time.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{CustomerId, ProductId};
use coordination::{AtomicCounter, CoordinationLock, Counter, InMemoryLock, LockToken};
use futures_util::future::join_all;
use inventory::{
    Clock, ConfirmOutcome, FlashSaleService, InventoryConfig, InventoryError, ManualClock,
};
use ledger::{InMemoryLedgerStore, InventoryEventType, LedgerStore, NewProduct, OrderStatus};

struct Harness {
    service: FlashSaleService<InMemoryLedgerStore>,
    store: InMemoryLedgerStore,
    counter: AtomicCounter,
    clock: ManualClock,
}

fn harness_with_lock(lock: Arc<dyn CoordinationLock>) -> Harness {
    let store = InMemoryLedgerStore::new();
    let counter = AtomicCounter::oversell_blocked();
    let clock = ManualClock::new(Utc::now());
    let service = FlashSaleService::new(
        store.clone(),
        lock,
        Arc::new(counter.clone()),
        Arc::new(clock.clone()),
        InventoryConfig::default(),
    );
    Harness {
        service,
        store,
        counter,
        clock,
    }
}

fn harness() -> Harness {
    harness_with_lock(Arc::new(InMemoryLock::new()))
}

impl Harness {
    async fn product(&self, stock: i64) -> ProductId {
        let now = self.clock.now();
        self.service
            .add_product(NewProduct {
                name: "iPhone 15 Pro Max".to_string(),
                description: None,
                price_cents: 119999,
                initial_stock: stock,
                sale_starts_at: now - Duration::minutes(5),
                sale_ends_at: now + Duration::days(4),
            })
            .await
            .unwrap()
            .id
    }

    async fn stock(&self, product_id: ProductId) -> i64 {
        self.store
            .get_product(product_id)
            .await
            .unwrap()
            .unwrap()
            .total_stock
    }

    async fn replayed(&self, product_id: ProductId) -> i64 {
        self.store
            .events_for_product(product_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.delta)
            .sum()
    }

    async fn released_events(&self, product_id: ProductId) -> Vec<ledger::InventoryEvent> {
        self.store
            .events_for_product(product_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == InventoryEventType::HoldReleased)
            .collect()
    }
}

/// Grants every acquire, leaving the ledger as the only guard.
struct NoopLock;

#[async_trait]
impl CoordinationLock for NoopLock {
    async fn try_acquire(
        &self,
        _key: &str,
        _token: &LockToken,
        _lease: StdDuration,
    ) -> coordination::Result<bool> {
        Ok(true)
    }

    async fn release(&self, _key: &str, _token: &LockToken) -> coordination::Result<bool> {
        Ok(true)
    }
}

mod oversell {
    use super::*;

    async fn race(h: &Harness, product_id: ProductId, buyers: usize) -> (usize, usize) {
        let handles: Vec<_> = (0..buyers)
            .map(|i| {
                let service = h.service.clone();
                let customer = CustomerId::new(format!("buyer-{i}"));
                tokio::spawn(async move { service.create_hold(product_id, 1, &customer).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(InventoryError::InsufficientStock { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        (succeeded, rejected)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_holds_fill_stock_exactly() {
        let h = harness();
        let product_id = h.product(10).await;

        let (succeeded, rejected) = race(&h, product_id, 40).await;

        assert_eq!(succeeded, 10);
        assert_eq!(rejected, 30);
        assert_eq!(h.stock(product_id).await, 0);
        assert_eq!(h.counter.value().await.unwrap(), 30);
        assert_eq!(h.replayed(product_id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_unit_goes_to_exactly_one_buyer() {
        let h = harness();
        let product_id = h.product(1).await;

        let (succeeded, rejected) = race(&h, product_id, 2).await;

        assert_eq!((succeeded, rejected), (1, 1));
        assert_eq!(h.stock(product_id).await, 0);
        assert_eq!(h.counter.value().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn ledger_alone_prevents_oversell_without_lock() {
        let h = harness_with_lock(Arc::new(NoopLock));
        let product_id = h.product(5).await;

        let (succeeded, rejected) = race(&h, product_id, 50).await;

        assert_eq!(succeeded, 5);
        assert_eq!(rejected, 45);
        assert_eq!(h.stock(product_id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mixed_quantities_never_exceed_initial_stock() {
        let h = harness();
        let product_id = h.product(7).await;

        let attempts = (1..=6).map(|quantity| {
            let service = h.service.clone();
            let customer = CustomerId::new(format!("buyer-{quantity}"));
            async move { service.create_hold(product_id, quantity, &customer).await }
        });
        let results = join_all(attempts).await;

        let held: i64 = h
            .store
            .order_quantities()
            .await
            .unwrap()
            .iter()
            .filter(|q| q.product_id == product_id)
            .map(|q| q.quantity)
            .sum();
        assert!(held <= 7);
        assert_eq!(h.stock(product_id).await, 7 - held);
        assert!(h.stock(product_id).await >= 0);
        assert!(results.iter().any(|r| r.is_ok()));
    }
}

mod expiry {
    use super::*;

    #[tokio::test]
    async fn late_confirm_expires_and_restocks() {
        let h = harness();
        let product_id = h.product(10).await;
        let alice = CustomerId::from("alice");

        let receipt = h.service.create_hold(product_id, 2, &alice).await.unwrap();
        assert_eq!(h.stock(product_id).await, 8);

        h.clock.advance(Duration::seconds(121));
        let err = h.service.confirm_order(receipt.order_id, &alice).await;
        assert!(matches!(err, Err(InventoryError::HoldExpired(id)) if id == receipt.order_id));

        assert_eq!(h.stock(product_id).await, 10);
        let order = h.store.find_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Expired);

        let released = h.released_events(product_id).await;
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].reason(), Some("expired_on_confirm"));
        assert_eq!(released[0].delta, 2);
    }

    #[tokio::test]
    async fn sweep_releases_unconfirmed_hold() {
        let h = harness();
        let product_id = h.product(10).await;
        let receipt = h
            .service
            .create_hold(product_id, 3, &CustomerId::from("alice"))
            .await
            .unwrap();

        h.clock.advance(Duration::seconds(150));
        let report = h.service.reconciler().sweep().await.unwrap();
        assert_eq!(report.expired, 1);

        assert_eq!(h.stock(product_id).await, 10);
        let order = h.store.find_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Expired);

        let released = h.released_events(product_id).await;
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].reason(), Some("worker_expired"));
    }

    #[tokio::test]
    async fn confirm_after_sweep_is_refused_without_events() {
        let h = harness();
        let product_id = h.product(10).await;
        let alice = CustomerId::from("alice");
        let receipt = h.service.create_hold(product_id, 2, &alice).await.unwrap();

        h.clock.advance(Duration::seconds(200));
        let report = h.service.reconciler().sweep().await.unwrap();
        assert_eq!(report.expired, 1);
        let events_before = h.store.event_count().await;

        let err = h.service.confirm_order(receipt.order_id, &alice).await;
        assert!(matches!(
            err,
            Err(InventoryError::OrderNotConfirmable { order_id, status: OrderStatus::Expired })
                if order_id == receipt.order_id
        ));
        assert_eq!(h.store.event_count().await, events_before);
        assert_eq!(h.stock(product_id).await, 10);
    }

    #[tokio::test]
    async fn confirmed_orders_are_never_swept() {
        let h = harness();
        let product_id = h.product(10).await;
        let alice = CustomerId::from("alice");
        let receipt = h.service.create_hold(product_id, 1, &alice).await.unwrap();
        h.service.confirm_order(receipt.order_id, &alice).await.unwrap();

        h.clock.advance(Duration::hours(1));
        let report = h.service.reconciler().sweep().await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(h.stock(product_id).await, 9);
    }

    #[tokio::test]
    async fn failed_release_is_retried_next_sweep() {
        let h = harness();
        let product_id = h.product(10).await;
        let stuck = h
            .service
            .create_hold(product_id, 1, &CustomerId::from("alice"))
            .await
            .unwrap();
        h.service
            .create_hold(product_id, 1, &CustomerId::from("bob"))
            .await
            .unwrap();
        h.store.fail_transitions_for(stuck.order_id).await;

        h.clock.advance(Duration::seconds(121));
        let report = h.service.reconciler().sweep().await.unwrap();
        assert_eq!((report.expired, report.failed), (1, 1));
        assert_eq!(h.stock(product_id).await, 9);

        h.store.clear_failures().await;
        let report = h.service.reconciler().sweep().await.unwrap();
        assert_eq!((report.expired, report.failed), (1, 0));
        assert_eq!(h.stock(product_id).await, 10);
    }
}

mod races {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn confirm_and_sweep_release_lapsed_hold_once() {
        for _ in 0..20 {
            let h = harness();
            let product_id = h.product(5).await;
            let alice = CustomerId::from("alice");
            let receipt = h.service.create_hold(product_id, 2, &alice).await.unwrap();
            h.clock.advance(Duration::seconds(200));

            let confirm = {
                let service = h.service.clone();
                let alice = alice.clone();
                tokio::spawn(async move { service.confirm_order(receipt.order_id, &alice).await })
            };
            let sweep = {
                let service = h.service.clone();
                tokio::spawn(async move { service.reconciler().sweep().await })
            };

            let confirmed = confirm.await.unwrap();
            sweep.await.unwrap().unwrap();

            // Either confirm released the hold itself, or lost the row to the
            // sweep and saw it already expired.
            assert!(matches!(
                confirmed,
                Err(InventoryError::HoldExpired(_))
                    | Err(InventoryError::OrderNotConfirmable {
                        status: OrderStatus::Expired,
                        ..
                    })
            ));
            assert_eq!(h.stock(product_id).await, 5);
            assert_eq!(h.released_events(product_id).await.len(), 1);
            assert_eq!(h.replayed(product_id).await, 5);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn confirm_and_sweep_at_expiry_boundary_settle_once() {
        for _ in 0..20 {
            let h = harness();
            let product_id = h.product(5).await;
            let alice = CustomerId::from("alice");
            let receipt = h.service.create_hold(product_id, 2, &alice).await.unwrap();
            // Confirm still accepts this instant while the sweep already
            // treats the hold as lapsed.
            h.clock.set(receipt.hold_expires_at);

            let confirm = {
                let service = h.service.clone();
                let alice = alice.clone();
                tokio::spawn(async move { service.confirm_order(receipt.order_id, &alice).await })
            };
            let sweep = {
                let service = h.service.clone();
                tokio::spawn(async move { service.reconciler().sweep().await })
            };
            let confirmed = confirm.await.unwrap();
            sweep.await.unwrap().unwrap();

            let order = h.store.find_order(receipt.order_id).await.unwrap().unwrap();
            match confirmed {
                Ok(ConfirmOutcome::Confirmed) => {
                    assert_eq!(order.status, OrderStatus::Confirmed);
                    assert_eq!(h.stock(product_id).await, 3);
                    assert!(h.released_events(product_id).await.is_empty());
                }
                Err(InventoryError::HoldExpired(_))
                | Err(InventoryError::OrderNotConfirmable {
                    status: OrderStatus::Expired,
                    ..
                }) => {
                    assert_eq!(order.status, OrderStatus::Expired);
                    assert_eq!(h.stock(product_id).await, 5);
                    assert_eq!(h.released_events(product_id).await.len(), 1);
                }
                other => panic!("unexpected confirm result: {other:?}"),
            }
            assert_eq!(h.replayed(product_id).await, h.stock(product_id).await);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_confirms_record_one_confirmation() {
        let h = harness();
        let product_id = h.product(5).await;
        let alice = CustomerId::from("alice");
        let receipt = h.service.create_hold(product_id, 1, &alice).await.unwrap();

        let attempts = (0..10).map(|_| {
            let service = h.service.clone();
            let alice = alice.clone();
            async move { service.confirm_order(receipt.order_id, &alice).await }
        });
        let results = join_all(attempts).await;

        let confirmed = results
            .iter()
            .filter(|r| matches!(r, Ok(ConfirmOutcome::Confirmed)))
            .count();
        let repeated = results
            .iter()
            .filter(|r| matches!(r, Ok(ConfirmOutcome::AlreadyConfirmed)))
            .count();
        assert_eq!((confirmed, repeated), (1, 9));

        let confirmations = h
            .store
            .events_for_product(product_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == InventoryEventType::OrderConfirmed)
            .count();
        assert_eq!(confirmations, 1);
    }
}

mod audit {
    use super::*;

    #[tokio::test]
    async fn replay_matches_stock_after_every_path() {
        let h = harness();
        let product_id = h.product(20).await;
        let alice = CustomerId::from("alice");

        let confirmed = h.service.create_hold(product_id, 3, &alice).await.unwrap();
        h.service.confirm_order(confirmed.order_id, &alice).await.unwrap();

        let lazily_expired = h.service.create_hold(product_id, 4, &alice).await.unwrap();
        let swept = h.service.create_hold(product_id, 5, &alice).await.unwrap();
        let _ = h
            .service
            .create_hold(product_id, 100, &alice)
            .await
            .unwrap_err();

        h.clock.advance(Duration::seconds(121));
        let _ = h
            .service
            .confirm_order(lazily_expired.order_id, &alice)
            .await
            .unwrap_err();
        h.service.reconciler().sweep().await.unwrap();

        let order = h.store.find_order(swept.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Expired);

        let audit = h.service.reports().audit_product(product_id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.total_stock, 17);
        assert_eq!(audit.replayed_stock, 17);
        // stock_added, 3x hold_created, order_confirmed, 2x hold_released
        assert_eq!(audit.event_count, 7);
    }
}

mod reports {
    use super::*;

    #[tokio::test]
    async fn live_products_show_holds_and_progress() {
        let h = harness();
        let product_id = h.product(10).await;
        let alice = CustomerId::from("alice");

        let held = h.service.create_hold(product_id, 2, &alice).await.unwrap();
        let bought = h.service.create_hold(product_id, 3, &alice).await.unwrap();
        h.service.confirm_order(bought.order_id, &alice).await.unwrap();

        let live = h.service.reports().live_products().await.unwrap();
        assert_eq!(live.len(), 1);
        let p = &live[0];
        assert_eq!((p.live_stock, p.holds, p.confirmed), (5, 2, 3));
        assert_eq!(p.percent_sold, 50);
        assert!(p.sale_active);
        assert_eq!(p.countdown_seconds, Duration::days(4).num_seconds());

        h.clock.advance(Duration::seconds(121));
        let _ = h.service.confirm_order(held.order_id, &alice).await;

        let stock = h.service.reports().live_stock(product_id).await.unwrap();
        assert_eq!((stock.live_stock, stock.holds, stock.confirmed), (7, 0, 3));
        assert_eq!(stock.percent_sold, 30);
    }

    #[tokio::test]
    async fn ended_sales_drop_out_of_live_listing() {
        let h = harness();
        let product_id = h.product(10).await;

        h.clock.advance(Duration::days(5));
        assert!(h.service.reports().live_products().await.unwrap().is_empty());

        let stock = h.service.reports().live_stock(product_id).await.unwrap();
        assert!(!stock.sale_active);
        assert_eq!(stock.countdown_seconds, 0);

        let err = h
            .service
            .create_hold(product_id, 1, &CustomerId::from("alice"))
            .await;
        assert!(matches!(err, Err(InventoryError::SaleNotActive(_))));
    }

    #[tokio::test]
    async fn metrics_and_snapshot_aggregate_every_status() {
        let h = harness();
        let product_id = h.product(10).await;
        let alice = CustomerId::from("alice");

        let a = h.service.create_hold(product_id, 1, &alice).await.unwrap();
        h.service.create_hold(product_id, 2, &alice).await.unwrap();
        h.service.confirm_order(a.order_id, &alice).await.unwrap();
        let _ = h.service.create_hold(product_id, 50, &alice).await;

        h.clock.advance(Duration::seconds(121));
        h.service.reconciler().sweep().await.unwrap();
        h.service.create_hold(product_id, 4, &alice).await.unwrap();

        let metrics = h.service.reports().inventory_metrics().await.unwrap();
        assert_eq!(metrics.total_products, 1);
        assert_eq!(metrics.total_stock, 5);
        assert_eq!(
            (metrics.pending_holds.count, metrics.pending_holds.quantity),
            (1, 4)
        );
        assert_eq!(
            (metrics.confirmed_orders.count, metrics.confirmed_orders.quantity),
            (1, 1)
        );
        assert_eq!(
            (metrics.expired_orders.count, metrics.expired_orders.quantity),
            (1, 2)
        );
        assert_eq!(metrics.oversell_attempts_blocked, 1);
        let created = metrics
            .inventory_events_summary
            .iter()
            .find(|s| s.event_type == InventoryEventType::HoldCreated)
            .unwrap();
        assert_eq!((created.count, created.total_delta), (3, -7));

        let snapshot = h.service.reports().product_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        let s = &snapshot[0];
        assert_eq!(
            (s.total_stock, s.pending_qty, s.confirmed_qty, s.expired_qty),
            (5, 4, 1, 2)
        );
        assert!(s.sale_active);
    }
}
