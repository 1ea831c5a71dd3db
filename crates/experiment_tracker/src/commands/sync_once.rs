//! Sync-once command - runs a single sync cycle.

use anyhow::{Context, Result};
use config::Config;

use super::build_cycle;
use crate::pipeline::{CycleReport, TrackerState};

/// Runs one cycle and prints what it did.
///
/// # Errors
///
/// Returns an error if setup fails or the cycle cannot complete.
pub async fn run(config: &Config) -> Result<()> {
    let cycle = build_cycle(config).await?;
    let mut state = TrackerState::default();

    let report = cycle.run(&mut state).await.context("Sync cycle failed")?;

    match report {
        CycleReport::Unchanged { sync } => {
            println!("No new metric records ({} already present)", sync.skipped);
        }
        CycleReport::NoData { .. } => println!("No metric records found"),
        CycleReport::Published {
            sync,
            contributors,
            best,
            pointer_advanced,
        } => {
            println!(
                "Fetched {} new record(s), {} failed",
                sync.fetched, sync.failed
            );
            println!("Published leaderboard with {contributors} contributor(s)");
            if pointer_advanced {
                println!("Best model: {best}");
            } else {
                println!("Best model {best} is not fully downloaded yet, pointer unchanged");
            }
        }
    }

    Ok(())
}
