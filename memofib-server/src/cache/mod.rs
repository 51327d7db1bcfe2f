//! Cache Module
//!
//! The capability contract every storage backend satisfies:
//! - `set` stores a string value under a key for a limited time
//! - `get` returns the value, or tells apart a missing key from an expired one
//!
//! Concrete backends (memory, disk) live in their own modules and are only
//! reachable through the backend loader.

pub mod disk;
pub mod memory;

use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors returned by a cache backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache: key not found")]
    NotFound,

    #[error("cache: key expired")]
    Expired,

    #[error("cache: storage error: {0}")]
    Storage(String),
}

impl CacheError {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::Storage(_) => "storage",
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Storage capability shared by every request of the process.
///
/// Both methods are called from the blocking pool and may be invoked
/// concurrently for the same key; implementations do their own locking.
/// `ctx` is the token of the request on whose behalf the call is made.
pub trait Cache: Send + Sync {
    /// Store `value` under `key`, expiring `ttl` from now. Last writer wins.
    fn set(&self, ctx: &CancellationToken, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the value stored under `key`.
    ///
    /// Fails with [`CacheError::NotFound`] when the key was never stored or was
    /// evicted, and with [`CacheError::Expired`] when its TTL has elapsed.
    fn get(&self, ctx: &CancellationToken, key: &str) -> Result<String>;
}

/// Cache that stores nothing. Used when no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopCache;

impl Cache for NopCache {
    fn set(&self, _: &CancellationToken, _: &str, _: &str, _: Duration) -> Result<()> {
        Ok(())
    }

    fn get(&self, _: &CancellationToken, _: &str) -> Result<String> {
        Err(CacheError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nop_cache_discards_writes() {
        let cache = NopCache;
        let ctx = CancellationToken::new();

        cache.set(&ctx, "10", "55", Duration::from_secs(15)).unwrap();
        assert_eq!(cache.get(&ctx, "10"), Err(CacheError::NotFound));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(CacheError::NotFound.to_string(), "cache: key not found");
        assert_eq!(CacheError::Expired.to_string(), "cache: key expired");
        assert_eq!(
            CacheError::Storage("disk full".to_string()).to_string(),
            "cache: storage error: disk full"
        );
        assert_eq!(CacheError::Expired.kind(), "expired");
    }
}
