//! Ready-made [`DataProducer`] implementations.

use std::future::Future;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::traits::{DataProducer, ProduceContext};
use crate::{MimirError, Result};

/// Adapts an async closure into a [`DataProducer`].
///
/// ```rust
/// # use mimir::worker::{FnProducer, ProduceContext};
/// let producer = FnProducer::new(|ctx: ProduceContext| async move {
///     Ok::<_, mimir::MimirError>(serde_json::json!({ "key": ctx.key }))
/// });
/// ```
pub struct FnProducer<F> {
    f: F,
}

impl<F> FnProducer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DataProducer for FnProducer<F>
where
    F: Fn(ProduceContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value>> + Send,
{
    async fn produce(&self, ctx: &ProduceContext) -> Result<serde_json::Value> {
        (self.f)(ctx.clone()).await
    }
}

/// Runs an external command and parses its stdout as JSON.
///
/// The command sees `MIMIR_KEY` and `MIMIR_FORCE` (`"1"` or `"0"`) in its
/// environment. A non-zero exit status fails the generation with the tail of
/// the command's stderr.
#[derive(Debug, Clone)]
pub struct CommandProducer {
    program: String,
    args: Vec<String>,
}

/// Bytes of stderr kept in error messages.
const STDERR_TAIL: usize = 2_048;

impl CommandProducer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from an argv-style list (`["./report.sh", "--json"]`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            MimirError::Configuration("producer command must not be empty".to_string())
        })?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl DataProducer for CommandProducer {
    async fn produce(&self, ctx: &ProduceContext) -> Result<serde_json::Value> {
        debug!(key = %ctx.key, program = %self.program, "running producer command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .env("MIMIR_KEY", &ctx.key)
            .env("MIMIR_FORCE", if ctx.force { "1" } else { "0" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                MimirError::generation(&ctx.key, format!("failed to spawn {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(MimirError::generation(
                &ctx.key,
                format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            MimirError::generation(&ctx.key, format!("{} printed invalid JSON: {e}", self.program))
        })
    }
}

/// Last [`STDERR_TAIL`] bytes of `stderr`, trimmed, lossily decoded.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
