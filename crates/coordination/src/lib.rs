//! Coordination primitives shared by every hold writer.
//!
//! - [`CoordinationLock`]: short-lived per-key mutual exclusion with a lease,
//!   used to thin out writers contending for the same product.
//! - [`Counter`]: process-wide monotonically increasing counters such as the
//!   number of blocked oversell attempts.
//!
//! Both come with an in-memory implementation for tests and single-process
//! deployments, and a Redis implementation for shared deployments.

pub mod counter;
pub mod error;
pub mod lock;

pub use counter::{AtomicCounter, Counter, OVERSELL_BLOCKED_KEY, RedisCounter};
pub use error::{CoordinationError, Result};
pub use lock::{
    CoordinationLock, CoordinationLockExt, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_LEASE, InMemoryLock,
    LockToken, RedisLock,
};

use redis::aio::ConnectionManager;

/// Opens a reconnecting Redis connection that the lock and counters can share.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let conn_manager = ConnectionManager::new(client).await?;
    tracing::info!("connected to Redis");
    Ok(conn_manager)
}
