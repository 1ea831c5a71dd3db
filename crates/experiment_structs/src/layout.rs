//! Layout of the local experiment cache.
//!
//! ```text
//! {root}/
//!   all_models_metrics.csv
//!   leaderboard.csv
//!   best_model.json
//!   {contributor}/{experiment}/
//!     {model}_model_metrics.json
//!     {model}_train_history.json
//!     {model}.safetensors
//!     data_details.json
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::ExperimentKey;

/// File name of the aggregated metrics table.
pub const ALL_METRICS_TABLE: &str = "all_models_metrics.csv";

/// File name of the ranked leaderboard table.
pub const LEADERBOARD_TABLE: &str = "leaderboard.csv";

/// File name of the best-model pointer.
pub const BEST_MODEL_POINTER: &str = "best_model.json";

/// Suffix appended to files while they are being written.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Resolves store-relative names to paths under the local root.
#[derive(Debug, Clone)]
pub struct LocalLayout {
    root: PathBuf,
}

impl LocalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a store-relative path (forward slashes) under the root.
    #[must_use]
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    #[must_use]
    pub fn experiment_dir(&self, key: &ExperimentKey) -> PathBuf {
        self.resolve(&key.experiment_prefix())
    }

    #[must_use]
    pub fn metrics_path(&self, key: &ExperimentKey) -> PathBuf {
        self.resolve(&key.metrics_path())
    }

    #[must_use]
    pub fn model_path(&self, key: &ExperimentKey) -> PathBuf {
        self.resolve(&key.model_path())
    }

    #[must_use]
    pub fn train_history_path(&self, key: &ExperimentKey) -> PathBuf {
        self.resolve(&key.train_history_path())
    }

    #[must_use]
    pub fn data_details_path(&self, key: &ExperimentKey) -> PathBuf {
        self.resolve(&key.data_details_path())
    }

    #[must_use]
    pub fn all_metrics_table(&self) -> PathBuf {
        self.root.join(ALL_METRICS_TABLE)
    }

    #[must_use]
    pub fn leaderboard_table(&self) -> PathBuf {
        self.root.join(LEADERBOARD_TABLE)
    }

    #[must_use]
    pub fn best_model_pointer(&self) -> PathBuf {
        self.root.join(BEST_MODEL_POINTER)
    }
}

/// Path a file is written to before being renamed into place.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Writes `contents` to a sibling temp file and renames it over `path`.
///
/// Readers see either the old file or the complete new one.
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(path);
    tokio::fs::write(&partial, contents).await?;
    tokio::fs::rename(&partial, path).await
}
