//! Worker and producer traits.
//!
//! The dispatcher never generates artifacts itself. It hands a
//! [`WorkerRequest`] to a [`Worker`], which decides *where* generation runs
//! (an isolated task, a child process). The data itself comes from a
//! [`DataProducer`], which is caller-supplied and possibly slow.
//!
//! # Example
//!
//! ```ignore
//! struct SalesReport { db: Pool }
//!
//! #[async_trait]
//! impl DataProducer for SalesReport {
//!     async fn produce(&self, ctx: &ProduceContext) -> Result<serde_json::Value> {
//!         let rows = self.db.query("select ...").await?;
//!         Ok(serde_json::to_value(rows)?)
//!     }
//! }
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::{CacheFileDescriptor, ModelCacheConfig, OutputFormat};

// ============================================================================
// Data Producer
// ============================================================================

/// What a producer is told about the generation it is serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceContext {
    pub key: String,
    /// The caller asked for a forced regeneration (e.g. an explicit reset).
    pub force: bool,
}

/// The model's data-producing function.
#[async_trait]
pub trait DataProducer: Send + Sync {
    async fn produce(&self, ctx: &ProduceContext) -> Result<serde_json::Value>;
}

// ============================================================================
// Worker
// ============================================================================

/// Everything a worker needs to generate and publish one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub key: String,
    pub cache_dir: PathBuf,
    /// Config file a child process should load its producer from.
    pub config_path: Option<PathBuf>,
    pub force: bool,
    pub format: OutputFormat,
    /// Pretty-print JSON output. Ignored for CBOR.
    pub pretty: bool,
}

impl WorkerRequest {
    pub fn for_model(config: &ModelCacheConfig, force: bool) -> Self {
        Self {
            key: config.key.clone(),
            cache_dir: config.cache_dir.clone(),
            config_path: None,
            force,
            format: OutputFormat::default(),
            pretty: false,
        }
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn produce_context(&self) -> ProduceContext {
        ProduceContext {
            key: self.key.clone(),
            force: self.force,
        }
    }
}

/// Execution strategy for artifact generation.
///
/// Implementations must publish atomically: on success the returned
/// descriptor points at a complete file under its final name.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate and publish one artifact.
    async fn run(&self, request: WorkerRequest) -> Result<CacheFileDescriptor>;
}
