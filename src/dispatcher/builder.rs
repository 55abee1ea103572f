//! Builder for configuring dispatcher instances

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use super::{DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL, Dispatcher, DispatcherInner, RefreshScheduler};
use crate::cache::{CacheCatalog, DEFAULT_PREFIX, FilenameCodec};
use crate::clock::{Clock, SystemClock};
use crate::types::{ModelCacheConfig, OutputFormat};
use crate::worker::{ArtifactWriter, DataProducer, ProgressObserver, TaskWorker, Worker};
use crate::{MimirError, Result};

/// Main entry point for creating dispatcher instances.
pub struct Mimir;

impl Mimir {
    /// Create a new builder for configuring the dispatcher.
    pub fn builder() -> MimirBuilder {
        MimirBuilder::new()
    }
}

/// Builder for configuring dispatcher instances.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use mimir::{Mimir, ModelCacheConfig};
/// use mimir::worker::{FnProducer, ProduceContext};
///
/// # async fn run() -> mimir::Result<()> {
/// let dispatcher = Mimir::builder()
///     .model(
///         ModelCacheConfig::new("sales", "/var/cache/mimir")
///             .ttl(Duration::from_secs(3600))
///             .refresh_interval(Duration::from_secs(600)),
///     )
///     .producer("sales", FnProducer::new(|_ctx: ProduceContext| async {
///         Ok::<_, mimir::MimirError>(serde_json::json!({ "total": 42 }))
///     }))
///     .build()?;
///
/// dispatcher.start().await;
/// let artifact = dispatcher.read("sales").await?;
/// println!("{}", artifact.path.display());
/// # Ok(())
/// # }
/// ```
pub struct MimirBuilder {
    prefix: Option<String>,
    models: Vec<ModelCacheConfig>,
    producers: HashMap<String, Arc<dyn DataProducer>>,
    worker: Option<Arc<dyn Worker>>,
    retention: usize,
    sweep_interval: Duration,
    clock: Option<Arc<dyn Clock>>,
    observer: Option<Arc<dyn ProgressObserver>>,
    format: OutputFormat,
    pretty: bool,
    config_path: Option<PathBuf>,
}

impl MimirBuilder {
    pub fn new() -> Self {
        Self {
            prefix: None,
            models: Vec::new(),
            producers: HashMap::new(),
            worker: None,
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            clock: None,
            observer: None,
            format: OutputFormat::default(),
            pretty: false,
            config_path: None,
        }
    }

    /// Cache file name prefix (default: `.mimir`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Track a model key.
    pub fn model(mut self, config: ModelCacheConfig) -> Self {
        self.models.push(config);
        self
    }

    /// Register the data producer for `key`. Used by the default task worker.
    pub fn producer(mut self, key: impl Into<String>, producer: impl DataProducer + 'static) -> Self {
        self.producers.insert(key.into(), Arc::new(producer));
        self
    }

    /// Same as [`producer`](Self::producer) for an already shared producer.
    pub fn shared_producer(mut self, key: impl Into<String>, producer: Arc<dyn DataProducer>) -> Self {
        self.producers.insert(key.into(), producer);
        self
    }

    /// Replace the default [`TaskWorker`], e.g. with a
    /// [`ProcessWorker`](crate::worker::ProcessWorker).
    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Files kept per key by the sweeper (default: 2, minimum: 1).
    pub fn retention(mut self, keep: usize) -> Self {
        self.retention = keep;
        self
    }

    /// Period between sweeps (default: 10 minutes).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Time source for stamps and TTL checks (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Progress observer for the default task worker.
    pub fn observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Artifact serialization format (default: JSON).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Pretty-print JSON artifacts.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Config file passed on to worker processes.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Validate the configuration and build the dispatcher.
    ///
    /// Creates every model's cache directory.
    pub fn build(self) -> Result<Dispatcher> {
        let codec = FilenameCodec::new(self.prefix.as_deref().unwrap_or(DEFAULT_PREFIX))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        if self.retention == 0 {
            return Err(MimirError::Configuration(
                "retention must keep at least one file".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(MimirError::Configuration(
                "sweep interval must be positive".to_string(),
            ));
        }
        if std::time::Instant::now()
            .checked_add(self.sweep_interval)
            .is_none()
        {
            return Err(MimirError::Configuration(format!(
                "sweep interval {:?} is too large",
                self.sweep_interval
            )));
        }

        let mut models = HashMap::with_capacity(self.models.len());
        for config in self.models {
            validate_model(&config)?;
            if models.contains_key(&config.key) {
                return Err(MimirError::Configuration(format!(
                    "model key {:?} configured twice",
                    config.key
                )));
            }
            std::fs::create_dir_all(&config.cache_dir).map_err(|e| {
                MimirError::Configuration(format!(
                    "cannot create cache dir {}: {e}",
                    config.cache_dir.display()
                ))
            })?;
            models.insert(config.key.clone(), config);
        }

        let worker: Arc<dyn Worker> = match self.worker {
            Some(worker) => {
                if !self.producers.is_empty() {
                    warn!(
                        worker = worker.name(),
                        "custom worker configured, registered producers are unused"
                    );
                }
                worker
            }
            None => {
                let keys: HashSet<&String> = models.keys().collect();
                if let Some(stray) = self.producers.keys().find(|k| !keys.contains(k)) {
                    return Err(MimirError::UnknownKey(stray.clone()));
                }

                let mut writer = ArtifactWriter::new(codec.clone(), Arc::clone(&clock));
                if let Some(observer) = self.observer {
                    writer = writer.with_observer(observer);
                }
                let mut worker = TaskWorker::new(writer);
                for (key, producer) in self.producers {
                    worker.add_producer(key, producer);
                }
                if let Some(missing) = models.keys().find(|k| !worker.has_producer(k)) {
                    return Err(MimirError::Configuration(format!(
                        "no producer registered for key {missing:?}"
                    )));
                }
                Arc::new(worker)
            }
        };

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                models,
                catalog: CacheCatalog::new(codec, Arc::clone(&clock)),
                worker,
                scheduler: RefreshScheduler::new(Arc::clone(&clock)),
                inflight: Mutex::new(HashMap::new()),
                ignore_actual: Mutex::new(HashSet::new()),
                sweeper: Mutex::new(None),
                stopped: AtomicBool::new(false),
                retention: self.retention,
                sweep_interval: self.sweep_interval,
                clock,
                format: self.format,
                pretty: self.pretty,
                config_path: self.config_path,
            }),
        })
    }
}

impl Default for MimirBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_model(config: &ModelCacheConfig) -> Result<()> {
    FilenameCodec::validate_key(&config.key)?;
    if config.retention == Some(0) {
        return Err(MimirError::Configuration(format!(
            "retention for {:?} must keep at least one file",
            config.key
        )));
    }
    if config.refresh_interval.is_some_and(|i| i.is_zero()) {
        return Err(MimirError::Configuration(format!(
            "refresh interval for {:?} must be positive",
            config.key
        )));
    }
    Ok(())
}
