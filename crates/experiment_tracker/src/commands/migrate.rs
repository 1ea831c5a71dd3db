//! Migrate command - applies the embedded database migrations.

use anyhow::{Context, Result};
use config::Config;
use database::{create_pool, run_migrations};
use tracing::info;

/// # Errors
///
/// Returns an error if `DATABASE_URL` is missing or a migration fails.
pub async fn run(config: &Config) -> Result<()> {
    let pool = create_pool(config.require_database_url()?)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await?;

    info!("Migrations completed successfully");
    Ok(())
}
