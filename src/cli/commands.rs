//! CLI command definitions for noteforge.
//!
//! Two long-running commands share one Redis instance: `serve` runs the
//! HTTP API and `worker` runs the generation loop. They are separate
//! processes so a slow pipeline never blocks request handling.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use crate::api::server::shutdown_signal;
use crate::api::{serve, AppState};
use crate::jobs::{NotesQueue, NotesWorker, RedisStore, DEFAULT_NAMESPACE};
use crate::llm::{GeminiClient, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};

/// Default address the API server binds to.
const DEFAULT_BIND: &str = "0.0.0.0:3001";

/// Default Redis connection URL.
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default queue poll interval for the worker, in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// AI-assisted lesson notes generator.
#[derive(Parser)]
#[command(name = "noteforge")]
#[command(about = "Generate structured lesson notes with AI assistance")]
#[command(version)]
#[command(
    long_about = "noteforge generates structured lesson notes through a two-phase AI pipeline.\n\nThe API server accepts submissions and streams progress over SSE; a separate\nworker process consumes the shared Redis queue and publishes progress events.\n\nExample usage:\n  noteforge serve --bind 0.0.0.0:3001\n  noteforge worker --redis-url redis://127.0.0.1:6379"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP API server (submit, status and stream endpoints).
    Serve(ServeArgs),

    /// Run the notes generation worker.
    Worker(WorkerArgs),
}

/// Arguments for `noteforge serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(short, long, default_value = DEFAULT_BIND, env = "NOTEFORGE_BIND")]
    pub bind: String,

    /// Redis connection URL.
    #[arg(long, default_value = DEFAULT_REDIS_URL, env = "REDIS_URL")]
    pub redis_url: String,

    /// Key namespace shared by the API and the worker.
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

/// Arguments for `noteforge worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Redis connection URL.
    #[arg(long, default_value = DEFAULT_REDIS_URL, env = "REDIS_URL")]
    pub redis_url: String,

    /// Key namespace shared by the API and the worker.
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Gemini API key (can also be set via GEMINI_API_KEY env var).
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model to generate with.
    #[arg(short, long, default_value = DEFAULT_MODEL, env = "GEMINI_MODEL")]
    pub model: String,

    /// Per-request timeout for generation calls, in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "GEMINI_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Seconds the blocking queue pop waits before re-checking for shutdown.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// This is a convenience function that parses CLI args and runs the command.
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the noteforge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => {
            run_serve_command(args).await?;
        }
        Commands::Worker(args) => {
            run_worker_command(args).await?;
        }
    }
    Ok(())
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    info!(redis_url = %args.redis_url, "Connecting to Redis");
    let store = Arc::new(RedisStore::connect(&args.redis_url).await?);

    let state = AppState::new(store, &args.namespace);
    serve(state, &args.bind).await?;

    Ok(())
}

async fn run_worker_command(args: WorkerArgs) -> anyhow::Result<()> {
    let api_key = args.api_key.ok_or_else(|| {
        anyhow::anyhow!("Missing API key: set GEMINI_API_KEY or pass --api-key")
    })?;

    let generator = Arc::new(
        GeminiClient::new(api_key, args.model).with_timeout(Duration::from_secs(args.timeout_secs)),
    );

    info!(redis_url = %args.redis_url, "Connecting to Redis");
    let store = Arc::new(RedisStore::connect(&args.redis_url).await?);
    let queue = NotesQueue::new(store, &args.namespace);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = NotesWorker::new(
        queue,
        generator,
        shutdown_rx,
        Duration::from_secs(args.poll_interval_secs),
    );
    let handle = tokio::spawn(worker.run());

    shutdown_signal().await;
    info!("Stopping worker");

    // Ignore send error - the worker may have already stopped
    let _ = shutdown_tx.send(());
    handle.await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        // Catches conflicting flags and malformed arg definitions.
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["noteforge", "serve"]).expect("parse");
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, DEFAULT_BIND);
                assert_eq!(args.namespace, DEFAULT_NAMESPACE);
            }
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_worker_flags() {
        let cli = Cli::try_parse_from([
            "noteforge",
            "worker",
            "--api-key",
            "k",
            "--model",
            "gemini-2.0-pro",
            "--poll-interval-secs",
            "2",
        ])
        .expect("parse");

        match cli.command {
            Commands::Worker(args) => {
                assert_eq!(args.api_key.as_deref(), Some("k"));
                assert_eq!(args.model, "gemini-2.0-pro");
                assert_eq!(args.poll_interval_secs, 2);
            }
            _ => panic!("expected worker command"),
        }
    }
}
