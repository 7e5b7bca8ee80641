//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::Config;
use api::error::StartupError;
use coordination::{
    AtomicCounter, CoordinationLock, Counter, InMemoryLock, RedisCounter, RedisLock,
};
use inventory::{FlashSaleService, SystemClock};
use ledger::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!("holds_created_total", "Stock holds placed");
    metrics::describe_counter!(
        "oversell_attempts_blocked_total",
        "Hold requests rejected for insufficient stock"
    );
    metrics::describe_counter!("orders_confirmed_total", "Holds confirmed into orders");
    metrics::describe_counter!("holds_expired_total", "Holds released after their TTL");
    metrics::describe_counter!(
        "lock_acquire_failures_total",
        "Product lock acquisitions that timed out"
    );
    metrics::describe_counter!(
        "expiry_sweep_failures_total",
        "Expiry sweep scans or per-hold releases that failed"
    );
    metrics::describe_histogram!(
        "expiry_sweep_duration_seconds",
        metrics::Unit::Seconds,
        "Duration of one expiry sweep"
    );
}

/// Builds the lock and oversell counter, shared through Redis when configured.
async fn coordination_backends(
    config: &Config,
) -> Result<(Arc<dyn CoordinationLock>, Arc<dyn Counter>), StartupError> {
    let Some(url) = &config.redis_url else {
        tracing::warn!("REDIS_URL not set, using in-process lock and counter");
        let lock: Arc<dyn CoordinationLock> = Arc::new(InMemoryLock::new());
        let counter: Arc<dyn Counter> = Arc::new(AtomicCounter::oversell_blocked());
        return Ok((lock, counter));
    };

    let conn = coordination::connect(url).await?;
    let lock: Arc<dyn CoordinationLock> = Arc::new(RedisLock::new(conn.clone()));
    let counter: Arc<dyn Counter> = Arc::new(RedisCounter::oversell_blocked(conn));
    Ok((lock, counter))
}

async fn serve<S: LedgerStore + Clone + 'static>(
    store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError> {
    let (lock, oversell_counter) = coordination_backends(&config).await?;
    let service = FlashSaleService::new(
        store,
        lock,
        oversell_counter,
        Arc::new(SystemClock),
        config.inventory(),
    );

    if config.seed_demo_data {
        let seeded = service.seed_demo_catalog().await?;
        if seeded == 0 {
            tracing::info!("catalog already populated, skipping demo seed");
        }
    }

    let (stop_reconciler, reconciler_stopped) = oneshot::channel::<()>();
    let reconciler = service.reconciler().clone().spawn(async move {
        let _ = reconciler_stopped.await;
    });

    let app = api::create_app(AppState::new(service), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_reconciler.send(());
    if let Err(e) = reconciler.await {
        tracing::error!(error = %e, "expiry reconciler task failed");
    }
    Ok(())
}

async fn run(config: Config) -> Result<(), StartupError> {
    let metrics_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.store_timeout)
                .connect(&url)
                .await?;
            let store =
                PostgresLedgerStore::new(pool).with_transaction_timeout(config.store_timeout);
            store.run_migrations().await?;
            tracing::info!("PostgreSQL ledger ready");
            serve(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping the ledger in memory");
            serve(InMemoryLedgerStore::new(), config, metrics_handle).await
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }

    tracing::info!("server shut down gracefully");
}
