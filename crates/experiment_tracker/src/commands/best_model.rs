//! Best-model command - prints the current best-model pointer.

use anyhow::{Context, Result};
use config::Config;
use experiment_structs::{BestModelPointer, LocalLayout};

/// # Errors
///
/// Returns an error if the pointer exists but cannot be read.
pub async fn run(config: &Config) -> Result<()> {
    let layout = LocalLayout::new(&config.experiments_path);

    match BestModelPointer::read(&layout.best_model_pointer())
        .await
        .context("Failed to read best-model pointer")?
    {
        Some(pointer) => println!("{}", serde_json::to_string_pretty(&pointer)?),
        None => println!("No best model has been published yet"),
    }

    Ok(())
}
