use std::path::PathBuf;

use experiment_structs::PointerError;

use crate::ModelFormatError;

/// A new model could not be made current.
///
/// The previously loaded model stays in service.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Pointer(#[from] PointerError),

    #[error("failed to read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model file `{}`: {source}", path.display())]
    InvalidModel {
        path: PathBuf,
        #[source]
        source: ModelFormatError,
    },

    #[error("invalid label mapping `{}`: {source}", path.display())]
    InvalidDetails {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("label mapping describes {labels:?} classes but the model has {classes}")]
    SchemaMismatch {
        labels: Option<usize>,
        classes: usize,
    },

    #[error("model loading task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("no best model has been published yet")]
    NoModel,

    #[error("expected {expected} features, got {actual}")]
    InputLength { expected: usize, actual: usize },

    #[error("model has no label for class {0}")]
    UnknownClass(usize),
}
