//! CLI command implementations.

use std::sync::Arc;

use anyhow::{Context, Result};
use artifact_sync::{FetchPoolConfig, ObjectArtifactStore};
use config::Config;
use database::{LeaderboardStore, MemoryLeaderboard, PgLeaderboard, create_pool};
use experiment_structs::LocalLayout;
use tracing::warn;

use crate::pipeline::SyncCycle;

pub mod best_model;
pub mod leaderboard;
pub mod migrate;
pub mod predict;
pub mod sync_once;
pub mod track;

/// Opens the Postgres leaderboard, or an in-process one if no database is
/// configured.
async fn open_leaderboard(config: &Config) -> Result<Arc<dyn LeaderboardStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, leaderboard is kept in memory only");
        return Ok(Arc::new(MemoryLeaderboard::default()));
    };

    let pool = create_pool(database_url)
        .await
        .context("Failed to connect to database")?;
    Ok(Arc::new(PgLeaderboard::new(pool)))
}

async fn build_cycle(config: &Config) -> Result<SyncCycle> {
    let (store, prefix) = config.open_artifact_store()?;
    let leaderboard = open_leaderboard(config).await?;

    Ok(SyncCycle::new(
        LocalLayout::new(&config.experiments_path),
        Arc::new(ObjectArtifactStore::new(store, prefix)),
        leaderboard,
        FetchPoolConfig {
            workers: config.fetch_workers,
            timeout: config.fetch_timeout,
            retries: config.fetch_retries,
            ..FetchPoolConfig::default()
        },
    ))
}
