//! Per-model cache configuration

use std::path::PathBuf;
use std::time::Duration;

/// Cache settings for one model key.
///
/// ```rust
/// # use mimir::ModelCacheConfig;
/// # use std::time::Duration;
/// let config = ModelCacheConfig::new("sales", "/var/cache/mimir")
///     .ttl(Duration::from_secs(3600))
///     .refresh_interval(Duration::from_secs(600));
/// assert_eq!(config.ttl_ms(), 3_600_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCacheConfig {
    /// Unique model key; embedded in cache file names.
    pub key: String,
    /// Directory holding this key's cache files.
    pub cache_dir: PathBuf,
    /// Maximum artifact age. `Duration::ZERO` disables the age check.
    pub ttl: Duration,
    /// Background refresh period, if any.
    pub refresh_interval: Option<Duration>,
    /// Files to keep per sweep; falls back to the dispatcher default.
    pub retention: Option<usize>,
}

impl ModelCacheConfig {
    /// A config with no TTL, no background refresh and default retention.
    pub fn new(key: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            cache_dir: cache_dir.into(),
            ttl: Duration::ZERO,
            refresh_interval: None,
            retention: None,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn retention(mut self, keep: usize) -> Self {
        self.retention = Some(keep);
        self
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }
}

/// Default cache directory: `$MIMIR_CACHE_DIR`, else `~/.cache/mimir`.
pub fn default_cache_dir() -> PathBuf {
    std::env::var("MIMIR_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("mimir")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_no_ttl_and_no_refresh() {
        let config = ModelCacheConfig::new("orders", "/tmp/cache");
        assert_eq!(config.ttl, Duration::ZERO);
        assert_eq!(config.ttl_ms(), 0);
        assert!(config.refresh_interval.is_none());
        assert!(config.retention.is_none());
    }

    #[test]
    fn builder_setters() {
        let config = ModelCacheConfig::new("orders", "/tmp/cache")
            .ttl(Duration::from_millis(5_000))
            .refresh_interval(Duration::from_secs(60))
            .retention(4);
        assert_eq!(config.ttl_ms(), 5_000);
        assert_eq!(config.refresh_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.retention, Some(4));
    }

    #[test]
    fn default_cache_dir_mentions_mimir() {
        if std::env::var("MIMIR_CACHE_DIR").is_err() {
            assert!(default_cache_dir().to_string_lossy().contains("mimir"));
        }
    }
}
