//! On-disk cache layout.
//!
//! - [`FilenameCodec`] maps `(key, created_at_ms)` to and from
//!   `<prefix>.<key>.<epoch-millis>.cache` names.
//!
//! - [`CacheCatalog`] scans cache directories, groups files by key, ranks
//!   them newest first and evaluates TTL freshness. Consulted by the
//!   [`Dispatcher`](crate::Dispatcher) on every `read` and by the sweeper.

pub mod catalog;
pub mod codec;

pub use catalog::{CacheCatalog, CatalogScan};
pub use codec::{DEFAULT_PREFIX, DecodedName, FilenameCodec};
