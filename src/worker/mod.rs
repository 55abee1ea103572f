//! Artifact generation.
//!
//! A [`Worker`] takes a [`WorkerRequest`] and returns the descriptor of a
//! freshly published cache file. Two strategies ship with the crate:
//!
//! - [`TaskWorker`] runs the model's [`DataProducer`] through an
//!   [`ArtifactWriter`] on an isolated tokio task. Used by default.
//! - [`ProcessWorker`] spawns a child process per generation, so a producer
//!   that leaks or crashes takes down only that process.

pub mod process;
pub mod producer;
pub mod task;
pub mod traits;
pub mod writer;

pub use process::ProcessWorker;
pub use producer::{CommandProducer, FnProducer};
pub use task::TaskWorker;
pub use traits::{DataProducer, ProduceContext, Worker, WorkerRequest};
pub use writer::{ArtifactWriter, LogObserver, ProgressObserver, Stage, StageEvent};
