//! Standalone daemon support.
//!
//! Turns a [`Config`] into a running [`Dispatcher`] whose producers are
//! external commands, and implements the child side of the
//! [`ProcessWorker`] protocol.

pub mod config;

pub use config::{Config, ModelSection, WorkerKind};

use std::path::Path;
use std::sync::Arc;

use crate::cache::FilenameCodec;
use crate::clock::SystemClock;
use crate::types::CacheFileDescriptor;
use crate::worker::{ArtifactWriter, CommandProducer, ProcessWorker, WorkerRequest};
use crate::{Dispatcher, Mimir, Result};

/// Build a dispatcher for every `[[models]]` entry in `config`.
///
/// `config_path` is forwarded to worker processes so they load the same
/// models.
pub fn build_dispatcher(config: &Config, config_path: &Path) -> Result<Dispatcher> {
    let mut builder = Mimir::builder()
        .prefix(&config.cache.prefix)
        .retention(config.cache.retention)
        .sweep_interval(config.sweep_interval())
        .format(config.cache.format)
        .pretty(config.cache.pretty)
        .config_path(config_path);

    for model in config.model_configs() {
        builder = builder.model(model);
    }

    match config.cache.worker {
        WorkerKind::Task => {
            for model in &config.models {
                builder = builder.producer(&model.key, CommandProducer::from_argv(&model.command)?);
            }
        }
        WorkerKind::Process => {
            builder = builder.worker(Arc::new(ProcessWorker::current_exe()?));
        }
    }

    builder.build()
}

/// Run one generation in this process and return its descriptor.
///
/// This is what `mimird generate` does when spawned by a [`ProcessWorker`].
pub async fn generate(config: &Config, request: &WorkerRequest) -> Result<CacheFileDescriptor> {
    let model = config.model(&request.key)?;
    FilenameCodec::validate_key(&model.key)?;

    let producer = CommandProducer::from_argv(&model.command)?;
    let writer = ArtifactWriter::new(FilenameCodec::new(&config.cache.prefix)?, Arc::new(SystemClock));
    writer.write(request, &producer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputFormat;

    fn config(dir: &Path, command: &[&str]) -> Config {
        let mut config = Config::default();
        config.cache.dir = Some(dir.to_path_buf());
        config.models.push(ModelSection {
            key: "sales".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            ttl_ms: 0,
            refresh_interval_ms: None,
            cache_dir: None,
            retention: None,
        });
        config
    }

    #[test]
    fn builds_task_dispatcher() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["true"]);
        let dispatcher = build_dispatcher(&config, Path::new("mimir.toml")).unwrap();
        assert_eq!(dispatcher.keys(), vec!["sales".to_string()]);
        assert_eq!(dispatcher.worker_name(), "task");
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &[]);
        assert!(build_dispatcher(&config, Path::new("mimir.toml")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_runs_configured_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["sh", "-c", r#"echo '{"total": 7}'"#]);
        let models = config.model_configs();
        let request = WorkerRequest::for_model(&models[0], false).format(OutputFormat::Cbor);

        let descriptor = generate(&config, &request).await.unwrap();
        assert!(descriptor.path.starts_with(dir.path()));
        assert_eq!(
            descriptor.read_value().await.unwrap(),
            serde_json::json!({"total": 7})
        );
    }
}
