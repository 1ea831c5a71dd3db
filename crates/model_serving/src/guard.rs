//! Hot swapping of the served model.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use experiment_structs::{BestModelPointer, DataDetails, ExperimentKey, LocalLayout};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{PredictError, ReloadError, Scorer, ScorerLoader};

/// A model ready to serve, together with its label mapping.
pub struct LoadedModel {
    pub key: ExperimentKey,
    pub details: DataDetails,
    scorer: Box<dyn Scorer>,
}

impl LoadedModel {
    pub fn predict(&self, features: &[f32]) -> Result<Prediction, PredictError> {
        let probabilities = self.scorer.probabilities(features)?;

        let (index, best) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or(PredictError::UnknownClass(0))?;

        let label = self
            .details
            .label_for(index)
            .ok_or(PredictError::UnknownClass(index))?;

        Ok(Prediction {
            label: label.to_owned(),
            confidence: (f64::from(best) * 10_000.0).round() / 100.0,
            probabilities,
            model: self.key.clone(),
        })
    }
}

/// Answer to a single prediction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label` as a percentage with two decimals.
    pub confidence: f64,
    pub probabilities: Vec<f32>,
    /// Model that produced this prediction.
    pub model: ExperimentKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// No best model has been published yet.
    NoPointer,
    Unchanged,
    /// The pointer names a model that already failed to load. It is tried
    /// again once the pointer is rewritten.
    Rejected,
    Swapped { previous: Option<ExperimentKey> },
}

/// Keeps the published best model loaded.
///
/// Predictions hold their own reference to the model they started with, so
/// a swap never disturbs requests already running.
pub struct ModelGuard {
    layout: LocalLayout,
    loader: Arc<dyn ScorerLoader>,
    current: ArcSwapOption<LoadedModel>,
    rejected: ArcSwapOption<BestModelPointer>,
    reload: Mutex<()>,
}

impl ModelGuard {
    pub fn new(layout: LocalLayout, loader: Arc<dyn ScorerLoader>) -> Self {
        Self {
            layout,
            loader,
            current: ArcSwapOption::empty(),
            rejected: ArcSwapOption::empty(),
            reload: Mutex::new(()),
        }
    }

    /// The model currently in service.
    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current.load_full()
    }

    pub fn current_key(&self) -> Option<ExperimentKey> {
        self.current().map(|model| model.key.clone())
    }

    /// Loads the model named by the best-model pointer if it differs from the
    /// one in service.
    ///
    /// On error nothing is swapped, and the same pointer is not loaded again
    /// until it is rewritten.
    pub async fn ensure_current(&self) -> Result<SwapOutcome, ReloadError> {
        let pointer_path = self.layout.best_model_pointer();
        let Some(pointer) = BestModelPointer::read(&pointer_path).await? else {
            return Ok(SwapOutcome::NoPointer);
        };

        if let Some(outcome) = self.settled(&pointer) {
            return Ok(outcome);
        }

        let _reload = self.reload.lock().await;
        // a concurrent caller may have finished the same reload
        if let Some(outcome) = self.settled(&pointer) {
            return Ok(outcome);
        }

        let model = match self.load(pointer.key.clone()).await {
            Ok(model) => model,
            Err(error) => {
                self.rejected.store(Some(Arc::new(pointer)));
                return Err(error);
            }
        };
        info!(model = %model.key, "Serving new best model");

        self.rejected.store(None);
        let previous = self.current.swap(Some(Arc::new(model)));
        Ok(SwapOutcome::Swapped {
            previous: previous.map(|model| model.key.clone()),
        })
    }

    /// Predicts with the current best model, reloading first if the pointer
    /// moved.
    ///
    /// A failed reload is logged and the previous model keeps serving.
    pub async fn predict(&self, features: &[f32]) -> Result<Prediction, PredictError> {
        if let Err(error) = self.ensure_current().await {
            warn!("Model reload failed, keeping current model: {error}");
        }

        let model = self.current().ok_or(PredictError::NoModel)?;
        model.predict(features)
    }

    fn settled(&self, pointer: &BestModelPointer) -> Option<SwapOutcome> {
        if self.current().is_some_and(|model| model.key == pointer.key) {
            return Some(SwapOutcome::Unchanged);
        }

        let rejected = self.rejected.load_full().is_some_and(|rejected| {
            rejected.key == pointer.key && rejected.published_at == pointer.published_at
        });
        rejected.then_some(SwapOutcome::Rejected)
    }

    async fn load(&self, key: ExperimentKey) -> Result<LoadedModel, ReloadError> {
        let details_path = self.layout.data_details_path(&key);
        let bytes = tokio::fs::read(&details_path)
            .await
            .map_err(|source| ReloadError::Read {
                path: details_path.clone(),
                source,
            })?;
        let details: DataDetails =
            serde_json::from_slice(&bytes).map_err(|source| ReloadError::InvalidDetails {
                path: details_path,
                source,
            })?;

        let model_path = self.layout.model_path(&key);
        debug!(path = %model_path.display(), "Loading model");
        let loader = Arc::clone(&self.loader);
        let scorer = tokio::task::spawn_blocking(move || loader.load(&model_path)).await??;

        let classes = scorer.class_count();
        match details.class_count() {
            Some(labels) if labels == classes => {}
            labels => return Err(ReloadError::SchemaMismatch { labels, classes }),
        }

        Ok(LoadedModel {
            key,
            details,
            scorer,
        })
    }
}
