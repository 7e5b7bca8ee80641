//! Application configuration loaded from environment variables.

use std::time::Duration;

use inventory::InventoryConfig;

/// Server configuration with defaults for every setting.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `DATABASE_URL`: PostgreSQL ledger; unset keeps the ledger in memory
/// - `REDIS_URL`: shared lock and counters; unset keeps them in process
/// - `HOLD_TTL_SECS` (120), `SWEEP_INTERVAL_SECS` (30)
/// - `LOCK_LEASE_MS` (5000), `LOCK_TIMEOUT_MS` (2000), `STORE_TIMEOUT_MS` (5000)
/// - `SEED_DEMO_DATA`: seed the demo catalog into an empty store (default `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub hold_ttl: Duration,
    pub sweep_interval: Duration,
    pub lock_lease: Duration,
    pub lock_timeout: Duration,
    pub store_timeout: Duration,
    pub seed_demo_data: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            hold_ttl: parsed("HOLD_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.hold_ttl),
            sweep_interval: parsed("SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            lock_lease: parsed("LOCK_LEASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_lease),
            lock_timeout: parsed("LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            store_timeout: parsed("STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            seed_demo_data: non_empty("SEED_DEMO_DATA")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.seed_demo_data),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Hold lifecycle settings for the inventory service.
    pub fn inventory(&self) -> InventoryConfig {
        InventoryConfig {
            hold_ttl: self.hold_ttl,
            lock_lease: self.lock_lease,
            lock_timeout: self.lock_timeout,
            sweep_interval: self.sweep_interval,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let inventory = InventoryConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            redis_url: None,
            hold_ttl: inventory.hold_ttl,
            sweep_interval: inventory.sweep_interval,
            lock_lease: inventory.lock_lease,
            lock_timeout: inventory.lock_timeout,
            store_timeout: ledger::postgres::DEFAULT_TRANSACTION_TIMEOUT,
            seed_demo_data: true,
        }
    }
}
