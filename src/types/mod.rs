//! Public types for the Mimir API.

mod config;
mod descriptor;
mod format;
mod report;

pub use config::{ModelCacheConfig, default_cache_dir};
pub use descriptor::CacheFileDescriptor;
pub use format::{CBOR_SELF_DESCRIBE_TAG, OutputFormat};
pub use report::{KeyStat, SweepReport, WarmupReport};
