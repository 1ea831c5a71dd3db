//! Change detection for metric records.

use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use experiment_structs::{ExperimentKey, LocalLayout};
use tracing::{debug, info, warn};

use crate::{ArtifactStore, RemoteObject, TransferError};

/// Newest local modification time already observed by a sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncWatermark(Option<DateTime<Utc>>);

impl SyncWatermark {
    #[must_use]
    pub const fn get(self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Moves the watermark forward to `observed` if it is newer.
    ///
    /// Returns whether the watermark moved.
    pub fn advance(&mut self, observed: Option<DateTime<Utc>>) -> bool {
        match (self.0, observed) {
            (_, None) => false,
            (Some(current), Some(observed)) if observed <= current => false,
            (_, Some(observed)) => {
                self.0 = Some(observed);
                true
            }
        }
    }
}

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Metric records found in the remote store.
    pub discovered: usize,
    pub fetched: usize,
    /// Records already complete locally.
    pub skipped: usize,
    pub failed: usize,
    /// Newest modification time among records fetched in this pass.
    pub latest_modified: Option<DateTime<Utc>>,
    /// Whether the pass moved the watermark.
    pub advanced: bool,
}

/// Pulls metric records that are not yet present in the local cache.
pub struct SyncEngine {
    store: Arc<dyn ArtifactStore>,
    layout: LocalLayout,
    fetch_timeout: Duration,
}

impl SyncEngine {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, layout: LocalLayout, fetch_timeout: Duration) -> Self {
        Self {
            store,
            layout,
            fetch_timeout,
        }
    }

    /// Fetches every remote metric record missing locally and advances
    /// `watermark` to the newest fetched modification time.
    ///
    /// Individual fetch failures are logged and skipped; the next pass picks
    /// them up again because they are still missing locally.
    ///
    /// # Errors
    ///
    /// Returns an error only if the remote store cannot be listed.
    pub async fn sync_metrics(
        &self,
        watermark: &mut SyncWatermark,
    ) -> Result<SyncOutcome, TransferError> {
        let listing = self.store.list("").await?;
        let mut outcome = SyncOutcome::default();

        for object in listing {
            let Some(key) = ExperimentKey::from_metrics_path(&object.path) else {
                continue;
            };
            outcome.discovered += 1;

            let local = self.layout.metrics_path(&key);
            if is_complete(&local, object.size).await {
                outcome.skipped += 1;
                continue;
            }

            match self.fetch_record(&key, &object, &local).await {
                Ok(modified) => {
                    info!(record = %key, "Fetched metric record");
                    outcome.fetched += 1;
                    outcome.latest_modified = outcome.latest_modified.max(Some(modified));
                }
                Err(error) => {
                    warn!(record = %key, "Skipping metric record: {error}");
                    outcome.failed += 1;
                }
            }
        }

        outcome.advanced = watermark.advance(outcome.latest_modified);

        debug!(
            discovered = outcome.discovered,
            fetched = outcome.fetched,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Metric sync pass complete"
        );

        Ok(outcome)
    }

    async fn fetch_record(
        &self,
        key: &ExperimentKey,
        object: &RemoteObject,
        local: &Path,
    ) -> Result<DateTime<Utc>, TransferError> {
        let directory = self.layout.experiment_dir(key);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| TransferError::Write {
                path: directory,
                source,
            })?;

        tokio::time::timeout(self.fetch_timeout, self.store.fetch(&object.path, local))
            .await
            .map_err(|_| TransferError::Timeout {
                path: object.path.clone(),
                timeout: self.fetch_timeout,
            })??;

        let modified = tokio::fs::metadata(local)
            .await
            .and_then(|metadata| metadata.modified())
            .map_or(object.last_modified, DateTime::<Utc>::from);

        Ok(modified)
    }
}

/// A local copy counts as present only if it has the remote object's size.
async fn is_complete(local: &Path, expected_size: u64) -> bool {
    match tokio::fs::metadata(local).await {
        Ok(metadata) if metadata.len() == expected_size => true,
        Ok(metadata) => {
            warn!(
                path = %local.display(),
                local_size = metadata.len(),
                expected_size,
                "Local copy is incomplete, fetching again"
            );
            false
        }
        Err(_) => false,
    }
}
