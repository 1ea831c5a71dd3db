//! Leaderboard command - prints the published ranking.

use anyhow::{Context, Result};
use config::Config;
use database::{LeaderboardRow, PgLeaderboard, browse_leaderboard, create_pool};
use experiment_structs::LocalLayout;

use crate::tables::read_leaderboard_table;

/// Prints the top `limit` rows (all rows for zero).
///
/// Reads the database when `DATABASE_URL` is set and the local
/// `leaderboard.csv` otherwise.
///
/// # Errors
///
/// Returns an error if the leaderboard cannot be read.
pub async fn run(config: &Config, limit: usize) -> Result<()> {
    let rows = if let Some(database_url) = config.database_url.as_deref() {
        let pool = create_pool(database_url)
            .await
            .context("Failed to connect to database")?;
        browse_leaderboard(&PgLeaderboard::new(pool), limit).await?
    } else {
        let mut rows = read_leaderboard_table(&LocalLayout::new(&config.experiments_path))
            .await
            .context("Failed to read local leaderboard table")?;
        if limit > 0 {
            rows.truncate(limit);
        }
        rows
    };

    if rows.is_empty() {
        println!("Leaderboard is empty");
        return Ok(());
    }

    print_rows(&rows);
    Ok(())
}

fn print_rows(rows: &[LeaderboardRow]) {
    println!(
        "{:>4}  {:<20} {:<20} {:<20} {:>9} {:>10}",
        "rank", "contributor", "experiment", "model", "accuracy", "loss"
    );
    for (index, row) in rows.iter().enumerate() {
        println!(
            "{:>4}  {:<20} {:<20} {:<20} {:>9.4} {:>10.4}",
            index + 1,
            row.contributor_id,
            row.experiment_id,
            row.model_name,
            row.accuracy,
            row.loss
        );
    }
}
