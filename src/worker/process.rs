//! Child-process worker.
//!
//! Each generation runs in a fresh process speaking a small protocol:
//!
//! ```text
//! <program> [base args] generate --key K --cache-dir D [--config C] [--force]
//!           --format json|cbor [--pretty]
//! ```
//!
//! The child publishes the artifact itself and prints the resulting
//! [`CacheFileDescriptor`] as JSON on stdout. `mimird generate` implements
//! the child side.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::producer::stderr_tail;
use super::traits::{Worker, WorkerRequest};
use crate::types::CacheFileDescriptor;
use crate::{MimirError, Result};

/// Runs generations in child processes.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    program: PathBuf,
    base_args: Vec<OsString>,
}

impl ProcessWorker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    /// Re-execute the running binary, which must understand `generate`.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| MimirError::Worker(format!("cannot locate current executable: {e}")))?;
        Ok(Self::new(exe))
    }

    /// Arguments placed before the `generate` subcommand.
    pub fn base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument list for `request`, after the program name.
    pub fn command_args(&self, request: &WorkerRequest) -> Vec<OsString> {
        let mut args = self.base_args.clone();
        args.push("generate".into());
        args.push("--key".into());
        args.push(request.key.clone().into());
        args.push("--cache-dir".into());
        args.push(request.cache_dir.clone().into());
        if let Some(config) = &request.config_path {
            args.push("--config".into());
            args.push(config.clone().into());
        }
        if request.force {
            args.push("--force".into());
        }
        args.push("--format".into());
        args.push(request.format.as_str().into());
        if request.pretty {
            args.push("--pretty".into());
        }
        args
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, request: WorkerRequest) -> Result<CacheFileDescriptor> {
        let key = request.key.as_str();
        debug!(key = %key, program = %self.program.display(), "spawning worker process");

        let output = Command::new(&self.program)
            .args(self.command_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                MimirError::Worker(format!(
                    "failed to spawn {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            return Err(MimirError::generation(
                key,
                format!(
                    "worker process exited with {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            ));
        }

        let descriptor: CacheFileDescriptor = serde_json::from_slice(&output.stdout)
            .map_err(|e| MimirError::Worker(format!("worker printed invalid descriptor: {e}")))?;

        if descriptor.key != key {
            return Err(MimirError::Worker(format!(
                "worker answered for key {:?}, expected {key:?}",
                descriptor.key
            )));
        }
        Ok(descriptor)
    }
}
