//! Disk Cache backend
//!
//! One JSON file per key under a directory. Files are written to a temporary
//! name and renamed into place, so a reader sees either the old or the new
//! entry. Deadlines are wall-clock based and survive restarts.

use super::{Cache, CacheError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, warn};

/// Environment variable holding the cache directory
pub const DIR_ENV: &str = "MEMOFIB_DISK_DIR";

const DEFAULT_DIR: &str = "./data/cache";
const ENTRY_EXT: &str = "entry";

/// On-disk representation of a single entry
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    value: String,
    expires_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn io_err(e: std::io::Error) -> CacheError {
    CacheError::Storage(e.to_string())
}

/// File-backed TTL store
pub struct DiskCache {
    directory: PathBuf,
    tmp_seq: AtomicU64,
    log: Span,
}

impl DiskCache {
    /// Open (or create) a cache rooted at `directory`
    pub fn open<P: AsRef<Path>>(directory: P, log: Span) -> anyhow::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)
            .with_context(|| format!("cannot create cache directory {}", directory.display()))?;

        Ok(Self {
            directory,
            tmp_seq: AtomicU64::new(0),
            log,
        })
    }

    /// Directory holding the entries
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", hex::encode(key.as_bytes()), ENTRY_EXT))
    }

    fn check_ctx(ctx: &CancellationToken) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(CacheError::Storage("context cancelled".to_string()));
        }
        Ok(())
    }
}

impl Cache for DiskCache {
    fn set(&self, ctx: &CancellationToken, key: &str, value: &str, ttl: Duration) -> Result<()> {
        Self::check_ctx(ctx)?;

        let entry = DiskEntry {
            value: value.to_string(),
            expires_at_ms: now_ms().saturating_add(ttl.as_millis() as u64),
        };
        let json = serde_json::to_vec(&entry).map_err(|e| CacheError::Storage(e.to_string()))?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            ".{}.{}.{}.tmp",
            hex::encode(key.as_bytes()),
            std::process::id(),
            seq
        );
        let tmp_path = self.directory.join(tmp_name);

        fs::write(&tmp_path, json).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp_path, self.entry_path(key)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }

        debug!(parent: &self.log, key = %key, "entry written");
        Ok(())
    }

    fn get(&self, ctx: &CancellationToken, key: &str) -> Result<String> {
        Self::check_ctx(ctx)?;

        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(CacheError::NotFound),
            Err(e) => return Err(io_err(e)),
        };

        let entry: DiskEntry = serde_json::from_slice(&raw).map_err(|e| {
            warn!(parent: &self.log, key = %key, error = %e, "corrupt cache entry");
            CacheError::Storage(format!("corrupt entry: {}", e))
        })?;

        if now_ms() >= entry.expires_at_ms {
            debug!(parent: &self.log, key = %key, "key expired");
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(parent: &self.log, key = %key, error = %e, "cannot remove expired entry")
                }
            }
            return Err(CacheError::Expired);
        }

        Ok(entry.value)
    }
}

/// Factory exported by the `disk` backend module
pub fn factory(log: Span) -> anyhow::Result<Arc<dyn Cache>> {
    let directory = std::env::var(DIR_ENV).unwrap_or_else(|_| DEFAULT_DIR.to_string());
    let cache = DiskCache::open(&directory, log.clone())?;
    info!(parent: &log, directory = %cache.directory().display(), "disk cache ready");
    Ok(Arc::new(cache))
}
