//! Mimir - cache coordination for pre-computed data artifacts
//!
//! This crate keeps one serialized artifact per model key on the local
//! filesystem, decides when an artifact is still fresh, deduplicates
//! concurrent generations, refreshes artifacts in the background and sweeps
//! superseded copies.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mimir::{Mimir, ModelCacheConfig};
//! use mimir::worker::{FnProducer, ProduceContext};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let dispatcher = Mimir::builder()
//!         .model(
//!             ModelCacheConfig::new("inventory", "/var/cache/mimir")
//!                 .ttl(Duration::from_secs(300))
//!                 .refresh_interval(Duration::from_secs(240)),
//!         )
//!         .producer("inventory", FnProducer::new(|_ctx: ProduceContext| async {
//!             Ok::<_, mimir::MimirError>(serde_json::json!({ "items": 1024 }))
//!         }))
//!         .build()?;
//!
//!     dispatcher.warmup().await;
//!     dispatcher.start().await;
//!
//!     // Fresh artifact from disk, or a newly generated one.
//!     let artifact = dispatcher.read("inventory").await?;
//!     println!("{}", artifact.read_value().await?);
//!     Ok(())
//! }
//! ```
//!
//! # Cache files
//!
//! Artifacts are published as `<prefix>.<key>.<epoch-millis>.cache` by
//! writing a temp file and renaming it, so a directory scan never sees a
//! partial artifact. See [`cache::FilenameCodec`].

pub mod cache;
pub mod clock;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod telemetry;
pub mod types;
pub mod version;
pub mod worker;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{Dispatcher, Mimir, MimirBuilder};
pub use error::{MimirError, Result};
pub use version::{PKG_VERSION, version_string};

// Re-export all types
pub use types::{
    CacheFileDescriptor, KeyStat, ModelCacheConfig, OutputFormat, SweepReport, WarmupReport,
};
