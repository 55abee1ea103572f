//! Status and maintenance reports

use std::path::PathBuf;

use serde::Serialize;

use super::descriptor::CacheFileDescriptor;
use crate::MimirError;

/// Snapshot of one key's cache state, as returned by
/// [`Dispatcher::stat()`](crate::Dispatcher::stat).
#[derive(Debug, Clone, Serialize)]
pub struct KeyStat {
    pub key: String,
    pub cache_dir: PathBuf,
    pub ttl_ms: u64,
    pub refresh_interval_ms: Option<u64>,
    /// Number of cache files on disk for this key.
    pub files: usize,
    pub total_size_bytes: u64,
    /// Newest file regardless of freshness.
    pub newest: Option<CacheFileDescriptor>,
    /// Newest file if it is still fresh; what `read` would serve.
    pub actual: Option<CacheFileDescriptor>,
    /// A generation is in flight right now.
    pub generating: bool,
    pub background_running: bool,
    /// A forced write is pending; `read` bypasses `actual`.
    pub ignore_actual: bool,
    pub next_refresh_at_ms: Option<u64>,
}

/// Outcome of one obsolete-cache sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of reading every key once at startup.
#[derive(Debug, Clone, Default)]
pub struct WarmupReport {
    pub ready: Vec<CacheFileDescriptor>,
    pub failed: Vec<(String, MimirError)>,
}

impl WarmupReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}
