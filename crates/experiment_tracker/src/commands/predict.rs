//! Predict command - scores a feature vector with the current best model.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use config::Config;
use experiment_structs::LocalLayout;
use model_serving::{ModelGuard, SafetensorsLoader};

/// Reads a JSON array of features from `input` and prints the prediction.
///
/// # Errors
///
/// Returns an error if the input is unreadable or no model can serve it.
pub async fn run(config: &Config, input: &Path) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let features: Vec<f32> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a JSON array of numbers", input.display()))?;

    let guard = ModelGuard::new(
        LocalLayout::new(&config.experiments_path),
        Arc::new(SafetensorsLoader),
    );
    let prediction = guard.predict(&features).await?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
