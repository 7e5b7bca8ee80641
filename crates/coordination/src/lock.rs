//! Lease-based per-key mutual exclusion.
//!
//! A lock is a `key -> (token, expiry)` entry in a shared store. Acquiring
//! is an atomic set-if-absent with expiry; releasing is an atomic
//! compare-and-delete, so a holder whose lease already ran out can never
//! remove a lock that a later caller now owns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::time::Instant;

use crate::error::{CoordinationError, Result};

/// Default lease for a product lock.
pub const DEFAULT_LEASE: Duration = Duration::from_millis(5000);

/// Default bound on how long `acquire` polls before giving up.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(2000);

const BACKOFF_BASE: Duration = Duration::from_millis(10);
const BACKOFF_MAX: Duration = Duration::from_millis(100);

/// Owner token proving which caller holds a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability interface of a coordination lock backend.
#[async_trait]
pub trait CoordinationLock: Send + Sync {
    /// One atomic set-if-absent-with-expiry attempt.
    ///
    /// Returns true if `token` now owns `key` for `lease`.
    async fn try_acquire(&self, key: &str, token: &LockToken, lease: Duration) -> Result<bool>;

    /// Deletes `key` only if it is still owned by `token`.
    ///
    /// Returns false (a no-op) when the lease already expired or the key
    /// belongs to someone else.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool>;
}

/// Polling acquisition on top of any [`CoordinationLock`].
#[async_trait]
pub trait CoordinationLockExt: CoordinationLock {
    /// Polls `try_acquire` with capped exponential backoff until it succeeds
    /// or `timeout` elapses.
    async fn acquire(&self, key: &str, lease: Duration, timeout: Duration) -> Result<LockToken> {
        let token = LockToken::generate();
        let started = Instant::now();
        let deadline = started + timeout;
        let mut backoff = BACKOFF_BASE;

        loop {
            if self.try_acquire(key, &token, lease).await? {
                return Ok(token);
            }

            let now = Instant::now();
            if now >= deadline {
                metrics::counter!("lock_acquire_failures_total").increment(1);
                return Err(CoordinationError::LockUnavailable {
                    key: key.to_string(),
                    waited: now - started,
                });
            }

            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }
}

impl<T: CoordinationLock + ?Sized> CoordinationLockExt for T {}

/// In-process lock table for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLock {
    entries: Arc<Mutex<HashMap<String, (LockToken, Instant)>>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is held by a lease that has not yet expired.
    pub fn is_held(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .is_some_and(|(_, expires_at)| Instant::now() < *expires_at)
    }
}

#[async_trait]
impl CoordinationLock for InMemoryLock {
    async fn try_acquire(&self, key: &str, token: &LockToken, lease: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some((_, expires_at)) = entries.get(key)
            && now < *expires_at
        {
            return Ok(false);
        }

        entries.insert(key.to_string(), (token.clone(), now + lease));
        Ok(true)
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((owner, _)) if owner == token => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Redis-backed lock shared by every process pointed at the same server.
///
/// Acquisition is `SET key token NX PX lease`; release runs a Lua script so
/// the ownership check and the delete happen atomically on the server.
#[derive(Clone)]
pub struct RedisLock {
    conn_manager: ConnectionManager,
}

const COMPARE_AND_DELETE: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

impl RedisLock {
    /// Wraps an existing connection manager.
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl CoordinationLock for RedisLock {
    async fn try_acquire(&self, key: &str, token: &LockToken, lease: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let lease_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let deleted: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }
}
