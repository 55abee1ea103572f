//! Artifact writer: produce, serialize, publish.
//!
//! A write runs in two observable stages, `produce` (call the model's
//! [`DataProducer`]) and `persist` (serialize into a temp file inside the
//! cache directory, then rename it to its final cache file name). The rename
//! is the publish step: readers scanning the directory either see the
//! complete file or nothing.
//!
//! On failure the temp file is left where it is for inspection. The temp name
//! is deterministic per key, so the next generation for that key overwrites it.

use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::traits::{DataProducer, WorkerRequest};
use crate::cache::FilenameCodec;
use crate::clock::Clock;
use crate::types::{CBOR_SELF_DESCRIBE_TAG, CacheFileDescriptor, OutputFormat};
use crate::{MimirError, Result};

// ============================================================================
// Progress
// ============================================================================

/// The two observable stages of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Produce,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Produce => f.write_str("produce"),
            Stage::Persist => f.write_str("persist"),
        }
    }
}

/// Stage transition reported to a [`ProgressObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started { key: String, stage: Stage },
    Finished { key: String, stage: Stage, elapsed: Duration },
}

/// Diagnostic side channel for write progress.
///
/// Observers must not block; they are called inline on the writer task.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &StageEvent);
}

/// Default observer: emits `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_event(&self, event: &StageEvent) {
        match event {
            StageEvent::Started { key, stage } => debug!(key = %key, %stage, "stage started"),
            StageEvent::Finished {
                key,
                stage,
                elapsed,
            } => debug!(
                key = %key,
                %stage,
                elapsed_ms = elapsed.as_millis() as u64,
                "stage finished"
            ),
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Produces and atomically publishes cache files.
#[derive(Clone)]
pub struct ArtifactWriter {
    codec: FilenameCodec,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ProgressObserver>,
}

impl ArtifactWriter {
    pub fn new(codec: FilenameCodec, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec,
            clock,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the default [`LogObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn codec(&self) -> &FilenameCodec {
        &self.codec
    }

    /// Temp file a generation for `key` writes into.
    pub fn temp_path(&self, cache_dir: &Path, key: &str) -> PathBuf {
        cache_dir.join(self.codec.temp_name(key))
    }

    /// Run `producer` and publish its output for `request.key`.
    ///
    /// The file is stamped with the time generation started, so its age
    /// reflects how old the data is. If a published file already carries
    /// that stamp, the stamp moves forward to the next free millisecond.
    pub async fn write(
        &self,
        request: &WorkerRequest,
        producer: &dyn DataProducer,
    ) -> Result<CacheFileDescriptor> {
        let key = request.key.as_str();
        let started_at_ms = self.clock.now_ms();

        tokio::fs::create_dir_all(&request.cache_dir)
            .await
            .map_err(|e| MimirError::filesystem(&request.cache_dir, e))?;

        let stage = self.begin(key, Stage::Produce);
        let value = producer
            .produce(&request.produce_context())
            .await
            .map_err(|e| match e {
                MimirError::Generation { .. } => e,
                other => MimirError::generation(key, other),
            })?;
        self.finish(key, stage);

        let stage = self.begin(key, Stage::Persist);
        let temp_path = self.temp_path(&request.cache_dir, key);

        let (format, pretty, path) = (request.format, request.pretty, temp_path.clone());
        tokio::task::spawn_blocking(move || serialize_to(&path, &value, format, pretty))
            .await
            .map_err(|e| MimirError::Worker(format!("serializer task failed: {e}")))??;

        let (created_at_ms, final_path) = self
            .free_name(&request.cache_dir, key, started_at_ms)
            .await?;

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| MimirError::filesystem(&final_path, e))?;

        let size_bytes = tokio::fs::metadata(&final_path)
            .await
            .map_err(|e| MimirError::filesystem(&final_path, e))?
            .len();
        self.finish(key, stage);

        info!(
            key = %key,
            path = %final_path.display(),
            size_bytes,
            format = %format,
            "published cache file"
        );

        Ok(CacheFileDescriptor {
            key: key.to_string(),
            path: final_path,
            size_bytes,
            created_at_ms,
        })
    }

    /// First stamp at or after `from` whose cache file name is not already a
    /// published file. Two generations in the same millisecond would
    /// otherwise replace each other's artifact.
    async fn free_name(&self, dir: &Path, key: &str, from: u64) -> Result<(u64, PathBuf)> {
        let mut stamp = from;
        loop {
            let path = dir.join(self.codec.encode(key, stamp));
            match tokio::fs::symlink_metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {
                    debug!(key = %key, stamp, "cache file name taken, bumping stamp");
                    stamp = stamp
                        .checked_add(1)
                        .ok_or_else(|| MimirError::generation(key, "no free cache file name"))?;
                }
                _ => return Ok((stamp, path)),
            }
        }
    }

    fn begin(&self, key: &str, stage: Stage) -> (Stage, Instant) {
        self.observer.on_event(&StageEvent::Started {
            key: key.to_string(),
            stage,
        });
        (stage, Instant::now())
    }

    fn finish(&self, key: &str, (stage, started): (Stage, Instant)) {
        self.observer.on_event(&StageEvent::Finished {
            key: key.to_string(),
            stage,
            elapsed: started.elapsed(),
        });
    }
}

/// Serialize `value` into `path`, flushed and synced.
fn serialize_to(
    path: &Path,
    value: &serde_json::Value,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| MimirError::filesystem(path, e))?;
    let mut out = BufWriter::new(file);

    match format {
        OutputFormat::Json if pretty => serde_json::to_writer_pretty(&mut out, value)?,
        OutputFormat::Json => serde_json::to_writer(&mut out, value)?,
        OutputFormat::Cbor => {
            out.write_all(&CBOR_SELF_DESCRIBE_TAG)
                .map_err(|e| MimirError::filesystem(path, e))?;
            ciborium::into_writer(value, &mut out)?;
        }
    }

    let file = out
        .into_inner()
        .map_err(|e| MimirError::filesystem(path, e.error()))?;
    file.sync_all().map_err(|e| MimirError::filesystem(path, e))
}
