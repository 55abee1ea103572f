//! Directory-backed cache catalog.
//!
//! The catalog holds no state of its own: every query re-scans the cache
//! directory, decodes file names through the [`FilenameCodec`], and ranks the
//! result newest-first. Scans are cheap next to generation, so the disk stays
//! the single source of truth.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use tokio_stream::wrappers::ReadDirStream;

use super::codec::FilenameCodec;
use crate::clock::Clock;
use crate::types::{CacheFileDescriptor, ModelCacheConfig};
use crate::{MimirError, Result};

/// Cache files grouped by key, each list sorted newest first.
pub type CatalogScan = HashMap<String, Vec<CacheFileDescriptor>>;

/// Finds and ranks cache files on disk.
pub struct CacheCatalog {
    codec: FilenameCodec,
    clock: Arc<dyn Clock>,
}

impl CacheCatalog {
    pub fn new(codec: FilenameCodec, clock: Arc<dyn Clock>) -> Self {
        Self { codec, clock }
    }

    pub fn codec(&self) -> &FilenameCodec {
        &self.codec
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Scan `dir` for cache files belonging to `keys`.
    ///
    /// Unrelated files, untracked keys and non-regular files are skipped. A
    /// missing directory yields an empty scan.
    pub async fn scan(&self, dir: &Path, keys: &HashSet<&str>) -> Result<CatalogScan> {
        let read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(MimirError::filesystem(dir, e)),
        };

        let entries: Vec<tokio::fs::DirEntry> = ReadDirStream::new(read_dir)
            .try_collect()
            .await
            .map_err(|e| MimirError::filesystem(dir, e))?;

        let mut grouped: CatalogScan = HashMap::new();
        for entry in entries {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(decoded) = self.codec.decode(&name) else {
                continue;
            };
            if !keys.contains(decoded.key.as_str()) {
                continue;
            }

            // The file may be swept between listing and stat; skip it then.
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            grouped
                .entry(decoded.key.clone())
                .or_default()
                .push(CacheFileDescriptor {
                    key: decoded.key,
                    path: entry.path(),
                    size_bytes: metadata.len(),
                    created_at_ms: decoded.created_at_ms,
                });
        }

        for files in grouped.values_mut() {
            files.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.path.cmp(&a.path))
            });
        }

        Ok(grouped)
    }

    /// All cache files for one configured key, newest first.
    pub async fn entry(&self, config: &ModelCacheConfig) -> Result<Vec<CacheFileDescriptor>> {
        let keys = HashSet::from([config.key.as_str()]);
        let mut scan = self.scan(&config.cache_dir, &keys).await?;
        Ok(scan.remove(&config.key).unwrap_or_default())
    }

    /// The newest file for `config.key` if it passes the TTL check.
    pub async fn actual(&self, config: &ModelCacheConfig) -> Result<Option<CacheFileDescriptor>> {
        let now = self.clock.now_ms();
        Ok(self
            .entry(config)
            .await?
            .into_iter()
            .next()
            .filter(|d| Self::is_fresh(d, config.ttl, now)))
    }

    /// TTL check. A zero TTL disables it; otherwise the artifact must be
    /// strictly younger than `ttl`.
    pub fn is_fresh(descriptor: &CacheFileDescriptor, ttl: Duration, now_ms: u64) -> bool {
        ttl.is_zero() || u128::from(descriptor.age_ms(now_ms)) < ttl.as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::path::PathBuf;

    fn descriptor(created_at_ms: u64) -> CacheFileDescriptor {
        CacheFileDescriptor {
            key: "sales".into(),
            path: PathBuf::from("/tmp/x"),
            size_bytes: 1,
            created_at_ms,
        }
    }

    #[test]
    fn zero_ttl_is_always_fresh() {
        let ten_years_ms = 10 * 365 * 24 * 3600 * 1000;
        let d = descriptor(0);
        assert!(CacheCatalog::is_fresh(&d, Duration::ZERO, ten_years_ms));
    }

    #[test]
    fn ttl_boundary() {
        let ttl = Duration::from_millis(60_000);
        assert!(CacheCatalog::is_fresh(&descriptor(1_000), ttl, 60_999));
        assert!(!CacheCatalog::is_fresh(&descriptor(1_000), ttl, 61_000));
        assert!(!CacheCatalog::is_fresh(&descriptor(1_000), ttl, 61_001));
    }

    #[test]
    fn future_timestamp_is_fresh() {
        let ttl = Duration::from_millis(10);
        assert!(CacheCatalog::is_fresh(&descriptor(5_000), ttl, 1_000));
    }

    #[tokio::test]
    async fn scan_missing_directory_is_empty() {
        let catalog = CacheCatalog::new(FilenameCodec::default(), Arc::new(ManualClock::new(0)));
        let keys = HashSet::from(["sales"]);
        let scan = catalog
            .scan(Path::new("/nonexistent/mimir/cache"), &keys)
            .await
            .unwrap();
        assert!(scan.is_empty());
    }
}
