//! Database model types.

use experiment_structs::{ExperimentKey, LeaderboardEntry, MetricRecord, ModelMetrics};
use serde::{Deserialize, Serialize};

/// One row of the `leaderboard` table.
///
/// Also the row shape of the CSV tables written next to the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardRow {
    pub contributor_id: String,
    pub experiment_id: String,
    pub model_name: String,
    pub trainable_parameters: f64,
    pub execution_time: f64,
    pub loss: f64,
    pub accuracy: f64,
    pub model_size: f64,
    pub learning_rate: f64,
    pub batch_size: f64,
    pub epochs: f64,
    pub optimizer: String,
}

impl LeaderboardRow {
    #[must_use]
    pub fn key(&self) -> ExperimentKey {
        ExperimentKey::new(
            self.contributor_id.clone(),
            self.experiment_id.clone(),
            self.model_name.clone(),
        )
    }
}

impl From<&MetricRecord> for LeaderboardRow {
    fn from(record: &MetricRecord) -> Self {
        let MetricRecord { key, metrics } = record;
        let ModelMetrics {
            trainable_parameters,
            execution_time,
            loss,
            accuracy,
            model_size,
            learning_rate,
            batch_size,
            epochs,
            optimizer,
        } = metrics;

        Self {
            contributor_id: key.contributor_id.clone(),
            experiment_id: key.experiment_id.clone(),
            model_name: key.model_name.clone(),
            trainable_parameters: *trainable_parameters,
            execution_time: *execution_time,
            loss: *loss,
            accuracy: *accuracy,
            model_size: *model_size,
            learning_rate: *learning_rate,
            batch_size: *batch_size,
            epochs: *epochs,
            optimizer: optimizer.clone(),
        }
    }
}

impl From<&LeaderboardEntry> for LeaderboardRow {
    fn from(entry: &LeaderboardEntry) -> Self {
        Self::from(&entry.record)
    }
}
