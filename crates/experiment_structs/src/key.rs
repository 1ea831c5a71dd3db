use core::fmt;

use serde::{Deserialize, Serialize};

/// Suffix of a per-model metric record file.
pub const METRICS_SUFFIX: &str = "_model_metrics.json";

/// Suffix of a per-model training history file.
pub const TRAIN_HISTORY_SUFFIX: &str = "_train_history.json";

/// Extension of a trained model binary.
pub const MODEL_EXTENSION: &str = "safetensors";

/// Per-experiment label mapping file name.
pub const DATA_DETAILS_FILE: &str = "data_details.json";

/// Identity of one candidate model: `{contributor}/{experiment}/{model}`.
///
/// Ordering is lexicographic over (contributor, experiment, model) and is the
/// tie-break order used when ranking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentKey {
    pub contributor_id: String,
    pub experiment_id: String,
    pub model_name: String,
}

impl ExperimentKey {
    pub fn new(
        contributor_id: impl Into<String>,
        experiment_id: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            contributor_id: contributor_id.into(),
            experiment_id: experiment_id.into(),
            model_name: model_name.into(),
        }
    }

    /// Parses a store-relative path of the shape
    /// `{contributor}/{experiment}/{model}_model_metrics.json`.
    ///
    /// Returns `None` for anything else, including paths nested deeper or
    /// shallower than three segments and empty segments.
    #[must_use]
    pub fn from_metrics_path(path: &str) -> Option<Self> {
        let mut segments = path.split('/');
        let contributor = segments.next()?;
        let experiment = segments.next()?;
        let file_name = segments.next()?;

        if segments.next().is_some() {
            return None;
        }

        let model_name = file_name.strip_suffix(METRICS_SUFFIX)?;

        if contributor.is_empty() || experiment.is_empty() || model_name.is_empty() {
            return None;
        }

        Some(Self::new(contributor, experiment, model_name))
    }

    /// Store-relative directory of the experiment.
    #[must_use]
    pub fn experiment_prefix(&self) -> String {
        format!("{}/{}", self.contributor_id, self.experiment_id)
    }

    /// Store-relative path of the metric record.
    #[must_use]
    pub fn metrics_path(&self) -> String {
        format!("{}/{}{METRICS_SUFFIX}", self.experiment_prefix(), self.model_name)
    }

    /// Store-relative path of the training history record.
    #[must_use]
    pub fn train_history_path(&self) -> String {
        format!(
            "{}/{}{TRAIN_HISTORY_SUFFIX}",
            self.experiment_prefix(),
            self.model_name
        )
    }

    /// Store-relative path of the trained model binary.
    #[must_use]
    pub fn model_path(&self) -> String {
        format!(
            "{}/{}.{MODEL_EXTENSION}",
            self.experiment_prefix(),
            self.model_name
        )
    }

    /// Store-relative path of the experiment's label mapping.
    #[must_use]
    pub fn data_details_path(&self) -> String {
        format!("{}/{DATA_DETAILS_FILE}", self.experiment_prefix())
    }

    /// All artifacts needed to serve this model.
    #[must_use]
    pub fn serving_artifacts(&self) -> [String; 3] {
        [
            self.model_path(),
            self.train_history_path(),
            self.data_details_path(),
        ]
    }
}

impl fmt::Display for ExperimentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.contributor_id, self.experiment_id, self.model_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_metrics_path() {
        let key = ExperimentKey::from_metrics_path("alice/exp1/mobilenet_model_metrics.json")
            .expect("valid path");
        assert_eq!(key, ExperimentKey::new("alice", "exp1", "mobilenet"));
        assert_eq!(key.metrics_path(), "alice/exp1/mobilenet_model_metrics.json");
    }

    #[test]
    fn test_from_metrics_path_rejects_other_shapes() {
        assert!(ExperimentKey::from_metrics_path("alice/exp1/mobilenet.safetensors").is_none());
        assert!(ExperimentKey::from_metrics_path("alice/mobilenet_model_metrics.json").is_none());
        assert!(
            ExperimentKey::from_metrics_path("a/b/c/mobilenet_model_metrics.json").is_none()
        );
        assert!(ExperimentKey::from_metrics_path("alice/exp1/_model_metrics.json").is_none());
        assert!(ExperimentKey::from_metrics_path("/exp1/m_model_metrics.json").is_none());
    }

    #[test]
    fn test_serving_artifacts() {
        let key = ExperimentKey::new("bob", "run7", "effnet");
        assert_eq!(
            key.serving_artifacts(),
            [
                "bob/run7/effnet.safetensors".to_owned(),
                "bob/run7/effnet_train_history.json".to_owned(),
                "bob/run7/data_details.json".to_owned(),
            ]
        );
    }

    #[test]
    fn test_ord_is_lexicographic() {
        let a = ExperimentKey::new("alice", "exp2", "a");
        let b = ExperimentKey::new("alice", "exp10", "a");
        let c = ExperimentKey::new("bob", "exp1", "a");
        assert!(b < a);
        assert!(a < c);
    }
}
