//! In-memory cache backend
//!
//! Radix trie of entries behind a single lock, with a second index ordered by
//! deadline. Expiry is checked lazily when a key is read; when the store is
//! full the entry closest to expiry (an already expired one if any) is
//! evicted to make room for a new key.

use super::{Cache, CacheError, Result};
use anyhow::Context;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info};

/// Environment variable holding the capacity of the store
pub const MAX_ENTRIES_ENV: &str = "MEMOFIB_MEMORY_MAX_ENTRIES";

const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Stored value with its expiration deadline
#[derive(Debug, Clone)]
struct StoredValue {
    data: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(data: String, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            expires_at: now
                .checked_add(ttl)
                .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64)),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of keys held at once
    pub max_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl MemoryConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(MAX_ENTRIES_ENV) {
            Ok(raw) => {
                let max_entries = raw
                    .parse::<usize>()
                    .with_context(|| format!("invalid {}: {:?}", MAX_ENTRIES_ENV, raw))?;
                if max_entries == 0 {
                    anyhow::bail!("{} must be greater than zero", MAX_ENTRIES_ENV);
                }
                Ok(Self { max_entries })
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Entries plus an index ordered by deadline, kept in step under one lock
struct Entries {
    values: Trie<String, StoredValue>,
    by_expiry: BTreeSet<(Instant, String)>,
}

impl Entries {
    fn insert(&mut self, key: &str, value: StoredValue) {
        let expires_at = value.expires_at;
        if let Some(previous) = self.values.insert(key.to_string(), value) {
            self.by_expiry.remove(&(previous.expires_at, key.to_string()));
        }
        self.by_expiry.insert((expires_at, key.to_string()));
    }

    fn remove(&mut self, key: &str) -> Option<StoredValue> {
        let removed = self.values.remove(key)?;
        self.by_expiry.remove(&(removed.expires_at, key.to_string()));
        Some(removed)
    }

    /// Key with the earliest deadline
    fn soonest(&self) -> Option<&str> {
        self.by_expiry.first().map(|(_, key)| key.as_str())
    }
}

/// Bounded in-memory TTL store
pub struct MemoryCache {
    data: RwLock<Entries>,
    config: MemoryConfig,
    log: Span,
}

impl MemoryCache {
    /// Create an empty store
    pub fn new(config: MemoryConfig, log: Span) -> Self {
        Self {
            data: RwLock::new(Entries {
                values: Trie::new(),
                by_expiry: BTreeSet::new(),
            }),
            config,
            log,
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.data.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the entry that expires first
    fn evict_one(&self, data: &mut Entries) {
        let Some(key) = data.soonest().map(str::to_string) else {
            return;
        };

        if data.values.get(&key).is_some_and(StoredValue::is_expired) {
            debug!(parent: &self.log, key = %key, "dropping expired entry for capacity");
        } else {
            debug!(parent: &self.log, key = %key, "evicting entry for capacity");
        }
        data.remove(&key);
    }
}

impl Cache for MemoryCache {
    fn set(&self, _ctx: &CancellationToken, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut data = self.data.write();

        if data.values.get(key).is_none() && data.values.len() >= self.config.max_entries {
            self.evict_one(&mut data);
        }

        data.insert(key, StoredValue::new(value.to_string(), ttl));
        Ok(())
    }

    fn get(&self, _ctx: &CancellationToken, key: &str) -> Result<String> {
        {
            let data = self.data.read();
            match data.values.get(key) {
                None => return Err(CacheError::NotFound),
                Some(value) if !value.is_expired() => return Ok(value.data.clone()),
                Some(_) => {}
            }
        }

        // Expired under the read lock; re-check before removing, a writer may
        // have replaced the entry in between
        let mut data = self.data.write();
        match data.values.get(key) {
            Some(value) if !value.is_expired() => Ok(value.data.clone()),
            Some(_) => {
                debug!(parent: &self.log, key = %key, "key expired");
                data.remove(key);
                Err(CacheError::Expired)
            }
            None => Err(CacheError::Expired),
        }
    }
}

/// Factory exported by the `memory` backend module
pub fn factory(log: Span) -> anyhow::Result<Arc<dyn Cache>> {
    let config = MemoryConfig::from_env()?;
    info!(parent: &log, max_entries = config.max_entries, "memory cache ready");
    Ok(Arc::new(MemoryCache::new(config, log)))
}
