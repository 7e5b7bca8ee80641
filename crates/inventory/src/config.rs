use std::time::Duration;

/// Default lifetime of a stock hold.
pub const DEFAULT_HOLD_TTL: Duration = Duration::from_secs(120);

/// Default pause between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Tunables of the hold lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryConfig {
    /// How long a pending hold keeps its stock before it may be released.
    pub hold_ttl: Duration,
    /// Lease on the per-product lock; must exceed the reservation transaction.
    pub lock_lease: Duration,
    /// How long a hold request waits for the product lock.
    pub lock_timeout: Duration,
    pub sweep_interval: Duration,
}

impl InventoryConfig {
    /// Hold TTL as a calendar duration for timestamp arithmetic.
    pub fn hold_ttl_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.hold_ttl).unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            hold_ttl: DEFAULT_HOLD_TTL,
            lock_lease: coordination::DEFAULT_LEASE,
            lock_timeout: coordination::DEFAULT_ACQUIRE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}
