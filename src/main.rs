//! Command-line interface for surreal-index-sync
//!
//! # Usage Examples
//!
//! ## Sync
//! ```bash
//! # First run against an empty index: films only, once
//! surreal-index-sync run --init --once \
//!   --pg-host localhost --pg-db movies_database \
//!   --surreal-endpoint http://localhost:8000
//!
//! # Keep every part in sync, every 10 minutes
//! surreal-index-sync run --freq 10m --extract-batch-size 500 --load-batch-size 200
//!
//! # Only genres, with cursors kept in SurrealDB
//! surreal-index-sync run --parts genres --state-table sync_state --once
//! ```
//!
//! ## State
//! ```bash
//! surreal-index-sync state show --state-file state.json
//! surreal-index-sync state reset --part persons
//! surreal-index-sync state reset --all
//! ```
//!
//! ## Checkpoint Format
//! The state file is a JSON object mapping cursor names (`films`, `persons`,
//! `persons_film`, `genres`, `genres_film`) to RFC 3339 timestamps.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use surreal_index_sync::config::duration_arg;
use surreal_index_sync::{
    open_tracker, run_once, run_scheduled, PipelineOpts, PostgresOpts, Retrier, RetryOpts,
    RetryPolicy, StateOpts, SurrealOpts, SyncSettings,
};
use sync_core::Part;

#[derive(Parser)]
#[command(name = "surreal-index-sync")]
#[command(about = "Incrementally sync the PostgreSQL movies catalogue into SurrealDB")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync changed rows into the index, once or on a schedule
    Run {
        #[command(flatten)]
        postgres: PostgresOpts,

        #[command(flatten)]
        surreal: SurrealOpts,

        #[command(flatten)]
        pipeline: PipelineOpts,

        #[command(flatten)]
        state: StateOpts,

        #[command(flatten)]
        retry: RetryOpts,

        /// Pause between runs (e.g. "600", "10m", "1h")
        #[arg(long, default_value = "10m", value_parser = duration_arg)]
        freq: Duration,

        /// Exit after a single run
        #[arg(long)]
        once: bool,
    },

    /// Inspect or modify the sync cursors
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Print every cursor as JSON
    Show {
        #[command(flatten)]
        state: StateOpts,

        #[command(flatten)]
        surreal: SurrealOpts,
    },

    /// Forget cursors so the next run starts over for those parts
    Reset {
        /// Parts whose cursors are removed
        #[arg(long = "part", value_delimiter = ',', required_unless_present = "all")]
        parts: Vec<Part>,

        /// Remove every cursor
        #[arg(long, conflicts_with = "parts")]
        all: bool,

        #[command(flatten)]
        state: StateOpts,

        #[command(flatten)]
        surreal: SurrealOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            postgres,
            surreal,
            pipeline,
            state,
            retry,
            freq,
            once,
        } => {
            let settings = SyncSettings {
                postgres: (&postgres).into(),
                target: surreal.index_target()?,
                surreal,
                state,
                pipeline: pipeline.pipeline_config(),
            };
            run_sync(settings, RetryPolicy::from(&retry), freq, once).await
        }
        Commands::State { command } => match command {
            StateCommands::Show { state, surreal } => {
                let tracker = open_tracker(&state, &surreal).await?;
                let json = serde_json::to_string_pretty(tracker.snapshot())
                    .context("Failed to serialize cursors")?;
                println!("{json}");
                Ok(())
            }
            StateCommands::Reset {
                parts,
                all,
                state,
                surreal,
            } => {
                let mut tracker = open_tracker(&state, &surreal).await?;
                let keys: Vec<String> = if all {
                    tracker.snapshot().keys().cloned().collect()
                } else {
                    parts
                        .iter()
                        .flat_map(|part| {
                            std::iter::once(part.cursor_key()).chain(part.owner_cursor_key())
                        })
                        .map(str::to_string)
                        .collect()
                };
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                let removed = tracker.remove(&keys).await?;
                tracing::info!("Removed {} cursors", removed);
                Ok(())
            }
        },
    }
}

async fn run_sync(
    settings: SyncSettings,
    policy: RetryPolicy,
    freq: Duration,
    once: bool,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = settings.pipeline.parts.iter().map(Part::as_str).collect();
    tracing::info!(
        "Starting sync of parts [{}] into '{}'",
        parts.join(", "),
        settings.target.name
    );

    let mut retrier = Retrier::new(policy);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };
    run_scheduled(&mut retrier, freq, once, || run_once(&settings), shutdown).await
}
