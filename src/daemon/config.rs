//! Configuration loading for mimird.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `./mimir.toml` (working directory)
//! 3. `~/.mimir/config.toml` (user)
//! 4. `/etc/mimir/config.toml` (system)
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/mimir"
//! retention = 2
//! sweep_interval_secs = 600
//! format = "cbor"
//! worker = "process"
//!
//! [warmup]
//! critical = true
//!
//! [[models]]
//! key = "sales"
//! command = ["./reports/sales.sh", "--json"]
//! ttl_ms = 3600000
//! refresh_interval_ms = 600000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::DEFAULT_PREFIX;
use crate::dispatcher::{DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL};
use crate::types::{ModelCacheConfig, OutputFormat, default_cache_dir};
use crate::{MimirError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub warmup: WarmupSection,
    #[serde(default)]
    pub models: Vec<ModelSection>,
}

/// Settings shared by every model.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Default cache directory (default: `$MIMIR_CACHE_DIR` or `~/.cache/mimir`).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Cache file name prefix (default: `.mimir`).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Files kept per key by the sweeper (default: 2).
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Seconds between sweeps (default: 600).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub pretty: bool,
    #[serde(default)]
    pub worker: WorkerKind,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: default_prefix(),
            retention: default_retention(),
            sweep_interval_secs: default_sweep_interval_secs(),
            format: OutputFormat::default(),
            pretty: false,
            worker: WorkerKind::default(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs()
}

/// Where generations run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Tokio task inside the daemon.
    #[default]
    Task,
    /// A `mimird generate` child process per generation.
    Process,
}

/// Startup warmup policy.
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupSection {
    /// Read every key once before serving (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Exit non-zero if any key fails to warm up (default: false).
    #[serde(default)]
    pub critical: bool,
}

impl Default for WarmupSection {
    fn default() -> Self {
        Self {
            enabled: true,
            critical: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One model and the command producing its data.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    pub key: String,
    /// Producer command, argv style. Must print JSON on stdout.
    pub command: Vec<String>,
    /// Maximum artifact age in milliseconds; 0 never expires.
    #[serde(default)]
    pub ttl_ms: u64,
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,
    /// Overrides `[cache] dir`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Overrides `[cache] retention`.
    #[serde(default)]
    pub retention: Option<usize>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Returns the resolved path alongside the config, since worker processes
    /// are pointed at the same file.
    pub fn load(explicit_path: Option<&Path>) -> Result<(PathBuf, Self)> {
        let path = Self::resolve_config_path(explicit_path)?;
        let config = Self::from_file(&path)?;
        Ok((path, config))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        let local_config = PathBuf::from("mimir.toml");
        if local_config.exists() {
            return Ok(local_config);
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MimirError::Configuration(
            "No config file found. Create ./mimir.toml, ~/.mimir/config.toml or /etc/mimir/config.toml"
                .to_string(),
        ))
    }

    pub fn model(&self, key: &str) -> Result<&ModelSection> {
        self.models
            .iter()
            .find(|m| m.key == key)
            .ok_or_else(|| MimirError::UnknownKey(key.to_string()))
    }

    /// Cache directory for models without their own.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    /// Library-level configs for every `[[models]]` entry.
    pub fn model_configs(&self) -> Vec<ModelCacheConfig> {
        let default_dir = self.cache_dir();
        self.models
            .iter()
            .map(|m| {
                let dir = m.cache_dir.clone().unwrap_or_else(|| default_dir.clone());
                let mut config =
                    ModelCacheConfig::new(&m.key, dir).ttl(Duration::from_millis(m.ttl_ms));
                if let Some(interval) = m.refresh_interval_ms {
                    config = config.refresh_interval(Duration::from_millis(interval));
                }
                if let Some(keep) = m.retention {
                    config = config.retention(keep);
                }
                config
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.cache.prefix, ".mimir");
        assert_eq!(config.cache.retention, 2);
        assert_eq!(config.cache.sweep_interval_secs, 600);
        assert_eq!(config.cache.worker, WorkerKind::Task);
        assert!(config.warmup.enabled);
        assert!(!config.warmup.critical);
        assert!(config.models.is_empty());
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [[models]]
            key = "sales"
            command = ["./sales.sh"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let model = config.model("sales").unwrap();
        assert_eq!(model.ttl_ms, 0);
        assert!(model.refresh_interval_ms.is_none());
        // Defaults preserved
        assert_eq!(config.cache.format, OutputFormat::Json);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [cache]
            dir = "/var/cache/mimir"
            prefix = ".reports"
            retention = 3
            sweep_interval_secs = 60
            format = "cbor"
            pretty = true
            worker = "process"

            [warmup]
            enabled = false
            critical = true

            [[models]]
            key = "sales"
            command = ["./sales.sh", "--json"]
            ttl_ms = 3600000
            refresh_interval_ms = 600000

            [[models]]
            key = "inventory"
            command = ["./inventory.sh"]
            cache_dir = "/srv/inventory"
            retention = 1
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.prefix, ".reports");
        assert_eq!(config.cache.format, OutputFormat::Cbor);
        assert_eq!(config.cache.worker, WorkerKind::Process);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert!(!config.warmup.enabled);
        assert!(config.warmup.critical);

        let models = config.model_configs();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].cache_dir, PathBuf::from("/var/cache/mimir"));
        assert_eq!(models[0].ttl_ms(), 3_600_000);
        assert_eq!(models[0].refresh_interval, Some(Duration::from_secs(600)));
        assert_eq!(models[1].cache_dir, PathBuf::from("/srv/inventory"));
        assert_eq!(models[1].retention, Some(1));
    }

    #[test]
    fn unknown_model_is_error() {
        let config = Config::default();
        assert!(matches!(
            config.model("nope"),
            Err(MimirError::UnknownKey(_))
        ));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/mimir.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mimir.toml");
        fs::write(&path, "[cache]\nretention = 5\n").unwrap();
        let (resolved, config) = Config::load(Some(&path)).unwrap();
        assert_eq!(resolved, path);
        assert_eq!(config.cache.retention, 5);
    }
}
