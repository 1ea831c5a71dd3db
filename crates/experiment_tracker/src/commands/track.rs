//! Track command - runs the sync scheduler until interrupted.

use anyhow::Result;
use config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::build_cycle;
use crate::scheduler::Scheduler;

/// Runs sync cycles every `SYNC_INTERVAL_SECS` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the store or database cannot be opened.
pub async fn run(config: &Config) -> Result<()> {
    let cycle = build_cycle(config).await?;
    let mut scheduler = Scheduler::new(cycle, config.sync_interval);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(error) => warn!("Failed to listen for Ctrl-C, shutting down: {error}"),
        }
        signal.cancel();
    });

    info!(
        local_root = %config.experiments_path.display(),
        store = %config.artifact_store_url,
        "Tracking experiments"
    );
    scheduler.run(shutdown).await;

    Ok(())
}
