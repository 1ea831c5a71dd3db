//! Experiment tracker
//!
//! Mirrors experiment metrics from a remote artifact store, publishes a
//! per-contributor leaderboard and stages the best model for serving.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use experiment_tracker::commands;
use tracing_subscriber::EnvFilter;

/// Experiment tracker
#[derive(Parser)]
#[command(name = "experiment-tracker")]
#[command(about = "Syncs experiment metrics and publishes the model leaderboard")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sync cycles on an interval until interrupted
    Track,

    /// Run a single sync cycle and exit
    SyncOnce,

    /// Print the published leaderboard
    Leaderboard {
        /// Number of rows to show (0 shows all)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Print the current best model
    BestModel,

    /// Predict with the current best model
    Predict {
        /// JSON file holding an array of input features
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Track => commands::track::run(&config).await?,
        Commands::SyncOnce => commands::sync_once::run(&config).await?,
        Commands::Leaderboard { limit } => commands::leaderboard::run(&config, limit).await?,
        Commands::BestModel => commands::best_model::run(&config).await?,
        Commands::Predict { input } => commands::predict::run(&config, &input).await?,
        Commands::Migrate => commands::migrate::run(&config).await?,
    }

    Ok(())
}
