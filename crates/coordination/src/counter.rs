//! Process-wide monotonically increasing counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::Result;

/// Redis key of the blocked-oversell counter.
pub const OVERSELL_BLOCKED_KEY: &str = "metrics:oversell_blocked";

/// A counter that only ever goes up.
///
/// Values are not durable: they start at zero with the process (or the
/// Redis instance) and are never decremented.
#[async_trait]
pub trait Counter: Send + Sync {
    /// Adds one and returns the new value.
    async fn increment(&self) -> Result<u64>;

    /// Reads the current value.
    async fn value(&self) -> Result<u64>;
}

/// In-process atomic counter, mirrored into the `metrics` facade.
#[derive(Debug, Clone)]
pub struct AtomicCounter {
    metric: &'static str,
    value: Arc<AtomicU64>,
}

impl AtomicCounter {
    /// Creates a counter reported to the metrics recorder as `metric`.
    pub fn new(metric: &'static str) -> Self {
        Self {
            metric,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter for oversell attempts blocked by the conditional update.
    pub fn oversell_blocked() -> Self {
        Self::new("oversell_attempts_blocked_total")
    }
}

#[async_trait]
impl Counter for AtomicCounter {
    async fn increment(&self) -> Result<u64> {
        metrics::counter!(self.metric).increment(1);
        Ok(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn value(&self) -> Result<u64> {
        Ok(self.value.load(Ordering::SeqCst))
    }
}

/// Counter kept under a Redis key so all processes share one value.
#[derive(Clone)]
pub struct RedisCounter {
    conn_manager: ConnectionManager,
    key: String,
    metric: &'static str,
}

impl RedisCounter {
    /// Creates a counter stored under `key` and reported as `metric`.
    pub fn new(
        conn_manager: ConnectionManager,
        key: impl Into<String>,
        metric: &'static str,
    ) -> Self {
        Self {
            conn_manager,
            key: key.into(),
            metric,
        }
    }

    /// Counter for oversell attempts blocked by the conditional update.
    pub fn oversell_blocked(conn_manager: ConnectionManager) -> Self {
        Self::new(
            conn_manager,
            OVERSELL_BLOCKED_KEY,
            "oversell_attempts_blocked_total",
        )
    }
}

#[async_trait]
impl Counter for RedisCounter {
    async fn increment(&self) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let value: u64 = conn.incr(&self.key, 1u64).await?;
        metrics::counter!(self.metric).increment(1);
        Ok(value)
    }

    async fn value(&self) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let value: Option<u64> = conn.get(&self.key).await?;
        Ok(value.unwrap_or(0))
    }
}
