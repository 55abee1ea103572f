//! mimird: mimir cache daemon.
//!
//! Keeps the configured model caches fresh in the background and doubles as
//! the worker binary for process-isolated generations (`mimird generate`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use mimir::daemon::{self, Config};
use mimir::worker::WorkerRequest;
use mimir::{MimirError, ModelCacheConfig, OutputFormat};

/// mimir daemon, background cache coordination.
#[derive(Parser)]
#[command(name = "mimird")]
#[command(version = mimir::PKG_VERSION)]
#[command(about = "mimir cache daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Warm up, then refresh and sweep in the background (default)
    Serve,

    /// Generate one artifact and print its descriptor as JSON
    Generate {
        /// Model key
        #[arg(long)]
        key: String,
        /// Cache directory to publish into
        #[arg(long)]
        cache_dir: PathBuf,
        /// Forced regeneration
        #[arg(long)]
        force: bool,
        /// Artifact format: json or cbor
        #[arg(long, default_value = "json")]
        format: OutputFormat,
        /// Pretty-print JSON artifacts
        #[arg(long)]
        pretty: bool,
    },

    /// Show per-key cache state as JSON
    Stat,

    /// List cache files per key
    Files,

    /// Force regeneration of a key
    Reset {
        /// Model key
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout belongs to the worker protocol; log to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (config_path, config) = Config::load(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, &config_path).await?,

        Command::Generate {
            key,
            cache_dir,
            force,
            format,
            pretty,
        } => {
            let request = WorkerRequest::for_model(&ModelCacheConfig::new(key, cache_dir), force)
                .format(format)
                .pretty(pretty)
                .config_path(Some(config_path));
            let descriptor = daemon::generate(&config, &request).await?;
            println!("{}", serde_json::to_string(&descriptor)?);
        }

        Command::Stat => {
            let dispatcher = daemon::build_dispatcher(&config, &config_path)?;
            let stats = dispatcher.stat().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Files => {
            let dispatcher = daemon::build_dispatcher(&config, &config_path)?;
            for (key, files) in dispatcher.list_files().await? {
                println!("{key}:");
                for file in files {
                    println!(
                        "  {} ({} bytes, created {})",
                        file.path.display(),
                        file.size_bytes,
                        file.created_at_ms
                    );
                }
            }
        }

        Command::Reset { key } => {
            let dispatcher = daemon::build_dispatcher(&config, &config_path)?;
            let descriptor = dispatcher.reset(&key).await?;
            println!("{}", descriptor.path.display());
        }
    }

    Ok(())
}

async fn serve(config: &Config, config_path: &std::path::Path) -> Result<(), MimirError> {
    let dispatcher = daemon::build_dispatcher(config, config_path)?;
    info!(
        version = mimir::version_string(),
        config = %config_path.display(),
        keys = dispatcher.keys().len(),
        worker = dispatcher.worker_name(),
        "mimird starting"
    );

    if config.warmup.enabled {
        let report = dispatcher.warmup().await;
        if !report.is_ok() && config.warmup.critical {
            for (key, err) in &report.failed {
                error!(key = %key, error = %err, "critical warmup failed");
            }
            dispatcher.shutdown();
            return Err(MimirError::Configuration(format!(
                "warmup failed for {} key(s)",
                report.failed.len()
            )));
        }
    }

    dispatcher.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    dispatcher.shutdown();
    Ok(())
}
