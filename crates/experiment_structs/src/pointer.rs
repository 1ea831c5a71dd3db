use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ExperimentKey, MetricRecord, ModelMetrics, write_atomic};

/// Error reading or writing the best-model pointer file.
#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    #[error("failed to access best-model pointer: {0}")]
    Io(#[from] io::Error),

    #[error("malformed best-model pointer: {0}")]
    Json(#[from] serde_json::Error),
}

/// Names the current global best model.
///
/// Written only after the model's artifacts are present locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModelPointer {
    #[serde(flatten)]
    pub key: ExperimentKey,

    pub metrics: ModelMetrics,

    pub published_at: DateTime<Utc>,
}

impl BestModelPointer {
    #[must_use]
    pub fn for_record(record: &MetricRecord) -> Self {
        Self {
            key: record.key.clone(),
            metrics: record.metrics.clone(),
            published_at: Utc::now(),
        }
    }

    /// Reads the pointer, returning `None` if none has been written yet.
    pub async fn read(path: &Path) -> Result<Option<Self>, PointerError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Atomically overwrites the pointer file.
    pub async fn write(&self, path: &Path) -> Result<(), PointerError> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, json).await?;
        Ok(())
    }
}
