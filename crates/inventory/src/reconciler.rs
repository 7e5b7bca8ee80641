//! Background release of lapsed holds.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ledger::{LedgerStore, ReleaseReason, Transition};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::error::Result;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Lapsed pending holds found by the scan.
    pub examined: usize,
    /// Holds this sweep moved to `expired`.
    pub expired: usize,
    /// Holds another caller settled between the scan and the lock.
    pub skipped: usize,
    /// Holds whose transaction failed; retried on the next sweep.
    pub failed: usize,
}

/// Periodically expires lapsed holds and returns their stock.
///
/// Each hold is released in its own transaction, so one failure neither
/// rolls back nor blocks the others.
#[derive(Clone)]
pub struct ExpiryReconciler<S: LedgerStore> {
    store: S,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<S: LedgerStore + Clone + 'static> ExpiryReconciler<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// Only the initial scan can fail the whole pass; per-hold failures are
    /// logged and counted in the report.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let lapsed = match self.store.find_lapsed_holds(now).await {
            Ok(lapsed) => lapsed,
            Err(e) => {
                metrics::counter!("expiry_sweep_failures_total").increment(1);
                return Err(e.into());
            }
        };

        let mut report = SweepReport {
            examined: lapsed.len(),
            ..SweepReport::default()
        };

        for order in lapsed {
            match self
                .store
                .expire_pending(order.id, ReleaseReason::WorkerExpired, now)
                .await
            {
                Ok(Transition::Applied(order)) => {
                    report.expired += 1;
                    metrics::counter!("holds_expired_total", "path" => "sweep").increment(1);
                    tracing::debug!(
                        order_id = %order.id,
                        product_id = %order.product_id,
                        restocked = order.quantity,
                        "hold expired"
                    );
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("expiry_sweep_failures_total").increment(1);
                    tracing::warn!(order_id = %order.id, error = %e, "failed to expire hold");
                }
            }
        }

        metrics::histogram!("expiry_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` resolves.
    ///
    /// The first sweep runs immediately. A sweep in progress is allowed to
    /// finish before the loop observes shutdown.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval = ?self.interval, "expiry reconciler started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => match self.sweep().await {
                    Ok(report) if report.examined > 0 => {
                        tracing::info!(
                            examined = report.examined,
                            expired = report.expired,
                            skipped = report.skipped,
                            failed = report.failed,
                            "expiry sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                },
            }
        }
        tracing::info!("expiry reconciler stopped");
    }

    /// Spawns [`run_until`](Self::run_until) onto the runtime.
    pub fn spawn<F>(self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move { self.run_until(shutdown).await })
    }
}
