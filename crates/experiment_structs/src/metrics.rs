use serde::{Deserialize, Serialize};

use crate::ExperimentKey;

/// Error raised when a metric record file cannot be used for ranking.
#[derive(Debug, thiserror::Error)]
pub enum MetricParseError {
    #[error("malformed metric record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metric record has a non-finite accuracy ({0})")]
    NonFiniteAccuracy(f64),
}

/// Metrics reported by the training process for one model.
///
/// Unknown fields in the source JSON are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
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

impl ModelMetrics {
    /// Parses a metric record file body.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MetricParseError> {
        let metrics: Self = serde_json::from_slice(bytes)?;

        if !metrics.accuracy.is_finite() {
            return Err(MetricParseError::NonFiniteAccuracy(metrics.accuracy));
        }

        Ok(metrics)
    }
}

/// One completed training run, identified by where it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub key: ExperimentKey,
    pub metrics: ModelMetrics,
}

impl MetricRecord {
    #[must_use]
    pub const fn new(key: ExperimentKey, metrics: ModelMetrics) -> Self {
        Self { key, metrics }
    }

    #[must_use]
    pub const fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }
}

/// A contributor's winning record and its position on the leaderboard.
///
/// Rank 1 is the global best.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub record: MetricRecord,
}
