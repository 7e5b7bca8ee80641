use std::time::Duration;

use thiserror::Error;

/// Errors raised by coordination primitives.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The lock could not be acquired before the acquire timeout elapsed.
    #[error("Lock '{key}' unavailable after {waited:?}")]
    LockUnavailable { key: String, waited: Duration },

    /// The shared coordination store failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for coordination operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;
