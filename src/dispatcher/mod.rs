//! Generation dispatcher.
//!
//! The [`Dispatcher`] is the coordination core. It answers `read` from the
//! catalog when it can, deduplicates concurrent generations per key, and
//! keeps the refresh scheduler and sweeper running.
//!
//! # In-flight deduplication
//!
//! Each running generation is a spawned task wrapped in a
//! [`Shared`] future and stored in the in-flight map under the key. Later
//! `write` calls clone the stored future instead of starting a new
//! generation, so every caller observes the same `Result`. The generation
//! task removes its own entry on settlement, before the result reaches any
//! waiter; the next `write` after that starts fresh.
//!
//! Dropping a `write` future does not cancel the generation.

mod builder;
mod lock;
pub mod scheduler;
mod sweeper;

pub use builder::{Mimir, MimirBuilder};
pub use scheduler::{RefreshScheduler, ScheduledRefresh};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, join_all};
use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CacheCatalog;
use crate::clock::Clock;
use crate::telemetry::{
    CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, GENERATION_DURATION_SECONDS, GENERATIONS_TOTAL,
    INFLIGHT_JOINS_TOTAL, REFRESH_CYCLES_TOTAL,
};
use crate::types::{
    CacheFileDescriptor, KeyStat, ModelCacheConfig, OutputFormat, SweepReport, WarmupReport,
};
use crate::worker::{Worker, WorkerRequest};
use crate::{MimirError, Result};
use lock::lock;

/// Default number of cache files kept per key by the sweeper.
pub const DEFAULT_RETENTION: usize = 2;

/// Default period between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

type PendingGeneration = Shared<BoxFuture<'static, Result<CacheFileDescriptor>>>;

/// Cheaply cloneable handle to one cache coordination instance.
///
/// Build one with [`Mimir::builder()`]. All clones share state. Dropping the
/// last clone stops the refresh timers and the sweeper.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

pub(crate) struct DispatcherInner {
    models: HashMap<String, ModelCacheConfig>,
    catalog: CacheCatalog,
    worker: Arc<dyn Worker>,
    scheduler: RefreshScheduler,
    inflight: Mutex<HashMap<String, PendingGeneration>>,
    ignore_actual: Mutex<HashSet<String>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    retention: usize,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
    format: OutputFormat,
    pretty: bool,
    config_path: Option<PathBuf>,
}

impl Dispatcher {
    /// Serve the current artifact for `key`, generating one if none is fresh.
    pub async fn read(&self, key: &str) -> Result<CacheFileDescriptor> {
        let config = self.inner.config(key)?;

        if !self.inner.is_ignored(key) {
            match self.inner.catalog.actual(config).await {
                Ok(Some(actual)) => {
                    counter!(CACHE_HITS_TOTAL, "key" => key.to_string()).increment(1);
                    return Ok(actual);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "cache scan failed, regenerating"),
            }
        }

        counter!(CACHE_MISSES_TOTAL, "key" => key.to_string()).increment(1);
        self.inner.write(key, false).await
    }

    /// Generate a new artifact for `key`, or join the one already running.
    ///
    /// With `force`, `read` stops serving the existing artifact until a
    /// generation for `key` succeeds.
    pub async fn write(&self, key: &str, force: bool) -> Result<CacheFileDescriptor> {
        self.inner.write(key, force).await
    }

    /// Forced regeneration; same as `write(key, true)`.
    pub async fn reset(&self, key: &str) -> Result<CacheFileDescriptor> {
        self.inner.write(key, true).await
    }

    /// Read every key concurrently. Failures are collected, never raised.
    pub async fn warmup(&self) -> WarmupReport {
        let keys = self.inner.sorted_keys();
        let results = join_all(keys.iter().map(|key| self.read(key))).await;

        let mut report = WarmupReport::default();
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(descriptor) => report.ready.push(descriptor),
                Err(e) => {
                    warn!(key = %key, error = %e, "warmup failed");
                    report.failed.push((key, e));
                }
            }
        }
        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            "cache warmup finished"
        );
        report
    }

    /// Arm background refresh for every key that has an interval and start
    /// the sweeper.
    ///
    /// A key whose newest file is younger than its interval first fires when
    /// that file turns one interval old; a key with no files fires at once.
    pub async fn start(&self) {
        let inner = &self.inner;
        inner.stopped.store(false, Ordering::SeqCst);

        for key in inner.sorted_keys() {
            let Some(config) = inner.models.get(&key) else {
                continue;
            };
            let Some(interval) = config.refresh_interval else {
                continue;
            };

            let delay = match inner.catalog.entry(config).await {
                Ok(files) => files.first().map_or(Duration::ZERO, |newest| {
                    interval.saturating_sub(Duration::from_millis(newest.age_ms(inner.clock.now_ms())))
                }),
                Err(e) => {
                    warn!(key = %key, error = %e, "cache scan failed, refreshing immediately");
                    Duration::ZERO
                }
            };
            inner.schedule_refresh(&key, delay, interval);
        }

        let handle = sweeper::spawn_sweeper(inner);
        if let Some(previous) = lock(&inner.sweeper, "start").replace(handle) {
            previous.abort();
        }
        info!(
            keys = inner.models.len(),
            refreshing = inner.scheduler.scheduled_count(),
            sweep_interval_secs = inner.sweep_interval.as_secs(),
            "cache dispatcher started"
        );
    }

    /// Stop refresh timers and the sweeper. Running generations finish.
    pub fn shutdown(&self) {
        self.inner.stop();
        info!("cache dispatcher stopped");
    }

    /// Run one sweep now.
    pub async fn sweep(&self) -> SweepReport {
        self.inner.sweep().await
    }

    pub async fn stat_key(&self, key: &str) -> Result<KeyStat> {
        let inner = &self.inner;
        let config = inner.config(key)?;
        let files = inner.catalog.entry(config).await?;
        let now = inner.clock.now_ms();

        let newest = files.first().cloned();
        let actual = newest
            .clone()
            .filter(|d| CacheCatalog::is_fresh(d, config.ttl, now));

        Ok(KeyStat {
            key: key.to_string(),
            cache_dir: config.cache_dir.clone(),
            ttl_ms: config.ttl_ms(),
            refresh_interval_ms: config.refresh_interval.map(|i| i.as_millis() as u64),
            files: files.len(),
            total_size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            newest,
            actual,
            generating: inner.is_generating(key),
            background_running: inner.scheduler.is_background_running(key),
            ignore_actual: inner.is_ignored(key),
            next_refresh_at_ms: inner.scheduler.next_due_ms(key),
        })
    }

    /// Per-key state for every configured key, sorted by key.
    pub async fn stat(&self) -> Result<Vec<KeyStat>> {
        let mut stats = Vec::with_capacity(self.inner.models.len());
        for key in self.inner.sorted_keys() {
            stats.push(self.stat_key(&key).await?);
        }
        Ok(stats)
    }

    /// Every cache file on disk for every configured key, newest first.
    ///
    /// Keys with no files map to an empty list.
    pub async fn list_files(&self) -> Result<BTreeMap<String, Vec<CacheFileDescriptor>>> {
        let mut by_dir: BTreeMap<&PathBuf, HashSet<&str>> = BTreeMap::new();
        for config in self.inner.models.values() {
            by_dir
                .entry(&config.cache_dir)
                .or_default()
                .insert(config.key.as_str());
        }

        let mut files: BTreeMap<String, Vec<CacheFileDescriptor>> = self
            .inner
            .models
            .keys()
            .map(|k| (k.clone(), Vec::new()))
            .collect();
        for (dir, keys) in by_dir {
            for (key, list) in self.inner.catalog.scan(dir, &keys).await? {
                files.insert(key, list);
            }
        }
        Ok(files)
    }

    /// Configured keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.sorted_keys()
    }

    pub fn config(&self, key: &str) -> Result<&ModelCacheConfig> {
        self.inner.config(key)
    }

    pub fn is_generating(&self, key: &str) -> bool {
        self.inner.is_generating(key)
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.inner.scheduler
    }

    pub fn worker_name(&self) -> &str {
        self.inner.worker.name()
    }
}

impl DispatcherInner {
    fn config(&self, key: &str) -> Result<&ModelCacheConfig> {
        self.models
            .get(key)
            .ok_or_else(|| MimirError::UnknownKey(key.to_string()))
    }

    fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.models.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn is_ignored(&self, key: &str) -> bool {
        lock(&self.ignore_actual, "is_ignored").contains(key)
    }

    fn is_generating(&self, key: &str) -> bool {
        lock(&self.inflight, "is_generating").contains_key(key)
    }

    fn request(&self, config: &ModelCacheConfig, force: bool) -> WorkerRequest {
        WorkerRequest::for_model(config, force)
            .format(self.format)
            .pretty(self.pretty)
            .config_path(self.config_path.clone())
    }

    async fn write(self: &Arc<Self>, key: &str, force: bool) -> Result<CacheFileDescriptor> {
        let config = self.config(key)?;

        let pending = {
            // Lock order: inflight, then ignore_actual.
            let mut inflight = lock(&self.inflight, "write");
            if force {
                lock(&self.ignore_actual, "write").insert(key.to_string());
            }

            match inflight.get(key) {
                Some(pending) => {
                    debug!(key = %key, force, "joining in-flight generation");
                    counter!(INFLIGHT_JOINS_TOTAL, "key" => key.to_string()).increment(1);
                    pending.clone()
                }
                None => {
                    debug!(key = %key, force, worker = self.worker.name(), "starting generation");
                    let task = tokio::spawn(Arc::clone(self).generate(self.request(config, force)));
                    let pending = Self::join_generation(Arc::downgrade(self), key.to_string(), task);
                    inflight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn join_generation(
        inner: Weak<Self>,
        key: String,
        task: JoinHandle<Result<CacheFileDescriptor>>,
    ) -> PendingGeneration {
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before settling; drop its entry here.
                    if let Some(inner) = inner.upgrade() {
                        lock(&inner.inflight, "join_generation").remove(&key);
                    }
                    error!(key = %key, error = %e, "generation task failed");
                    Err(MimirError::Worker(format!("generation task for {key} failed: {e}")))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn generate(self: Arc<Self>, request: WorkerRequest) -> Result<CacheFileDescriptor> {
        let key = request.key.clone();
        let started = Instant::now();
        let result = self.worker.run(request).await;
        self.settle(&key, &result, started.elapsed());
        result
    }

    /// Bookkeeping at the end of a generation, before waiters see the result.
    fn settle(self: &Arc<Self>, key: &str, result: &Result<CacheFileDescriptor>, elapsed: Duration) {
        {
            let mut inflight = lock(&self.inflight, "settle");
            inflight.remove(key);
            if result.is_ok() {
                lock(&self.ignore_actual, "settle").remove(key);
            }
        }

        let status = match result {
            Ok(descriptor) => {
                debug!(
                    key = %key,
                    path = %descriptor.path.display(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "generation finished"
                );
                let interval = self.models.get(key).and_then(|c| c.refresh_interval);
                if let Some(interval) = interval
                    && !self.scheduler.is_background_running(key)
                {
                    self.schedule_refresh(key, interval, interval);
                }
                "ok"
            }
            Err(e) => {
                error!(key = %key, error = %e, worker = self.worker.name(), "generation failed");
                "error"
            }
        };

        counter!(GENERATIONS_TOTAL, "key" => key.to_string(), "status" => status).increment(1);
        histogram!(GENERATION_DURATION_SECONDS, "key" => key.to_string())
            .record(elapsed.as_secs_f64());
    }

    fn schedule_refresh(self: &Arc<Self>, key: &str, delay: Duration, interval: Duration) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(self);
        let owned = key.to_string();
        self.scheduler.arm(key, delay, interval, async move {
            if let Some(inner) = weak.upgrade() {
                // Own task, so the cycle's re-arm cannot abort the cycle itself.
                tokio::spawn(inner.background_cycle(owned, interval));
            }
        });
    }

    fn background_cycle(self: Arc<Self>, key: String, interval: Duration) -> BoxFuture<'static, ()> {
        async move {
            self.scheduler.set_background_running(&key, true);
            let result = self.write(&key, false).await;
            self.scheduler.set_background_running(&key, false);

            let status = match &result {
                Ok(descriptor) => {
                    info!(key = %key, path = %descriptor.path.display(), "background refresh finished");
                    "ok"
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "background refresh failed");
                    "error"
                }
            };
            counter!(REFRESH_CYCLES_TOTAL, "key" => key.clone(), "status" => status).increment(1);

            self.schedule_refresh(&key, interval, interval);
        }
        .boxed()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.scheduler.cancel_all();
        if let Some(handle) = lock(&self.sweeper, "stop").take() {
            handle.abort();
        }
    }
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        self.stop();
    }
}
