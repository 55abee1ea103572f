//! In-process worker backed by isolated tokio tasks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use super::traits::{DataProducer, Worker, WorkerRequest};
use super::writer::ArtifactWriter;
use crate::types::CacheFileDescriptor;
use crate::{MimirError, Result};

/// Runs each generation on its own spawned task.
///
/// A producer that panics fails only its own generation: the panic surfaces
/// as a [`MimirError::Generation`] instead of unwinding into the dispatcher.
pub struct TaskWorker {
    producers: HashMap<String, Arc<dyn DataProducer>>,
    writer: ArtifactWriter,
}

impl TaskWorker {
    pub fn new(writer: ArtifactWriter) -> Self {
        Self {
            producers: HashMap::new(),
            writer,
        }
    }

    /// Register the producer for `key`, replacing any previous one.
    pub fn add_producer(&mut self, key: impl Into<String>, producer: Arc<dyn DataProducer>) {
        self.producers.insert(key.into(), producer);
    }

    pub fn has_producer(&self, key: &str) -> bool {
        self.producers.contains_key(key)
    }
}

#[async_trait]
impl Worker for TaskWorker {
    fn name(&self) -> &str {
        "task"
    }

    async fn run(&self, request: WorkerRequest) -> Result<CacheFileDescriptor> {
        let producer = self
            .producers
            .get(&request.key)
            .cloned()
            .ok_or_else(|| MimirError::UnknownKey(request.key.clone()))?;
        let writer = self.writer.clone();
        let key = request.key.clone();

        tokio::spawn(async move { writer.write(&request, producer.as_ref()).await })
            .await
            .unwrap_or_else(|e| {
                error!(key = %key, error = %e, "generation task aborted");
                Err(MimirError::generation(
                    key,
                    if e.is_panic() {
                        "producer panicked".to_string()
                    } else {
                        format!("generation task aborted: {e}")
                    },
                ))
            })
    }
}
