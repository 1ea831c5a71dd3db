//! One sync cycle: pull new records, rank, publish, fetch winners, point at
//! the best model.

use std::io;
use std::sync::Arc;

use artifact_sync::{
    ArtifactStore, FetchPool, FetchPoolConfig, FetchTask, SyncEngine, SyncOutcome, SyncWatermark,
    TransferError,
};
use database::{LeaderboardRow, LeaderboardStore, PublishError, publish_leaderboard};
use experiment_structs::{BestModelPointer, ExperimentKey, LocalLayout, PointerError};
use tracing::{info, warn};

use crate::aggregate::{Aggregate, aggregate};
use crate::tables::write_tables;

/// A cycle that could not complete; the next cycle retries it.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("metric sync failed: {0}")]
    Sync(#[from] TransferError),

    #[error("failed to read local metric records: {0}")]
    Aggregate(#[source] io::Error),

    #[error("leaderboard publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("failed to write best-model pointer: {0}")]
    Pointer(#[from] PointerError),
}

/// State carried from one cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerState {
    pub watermark: SyncWatermark,
    /// Set when the published state may lag behind the local records.
    ///
    /// Starts set so a fresh process publishes what is already cached.
    pub pending_publish: bool,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            watermark: SyncWatermark::default(),
            pending_publish: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// Nothing new since the last successful publish.
    Unchanged { sync: SyncOutcome },
    /// No metric records exist yet.
    NoData { sync: SyncOutcome },
    Published {
        sync: SyncOutcome,
        contributors: usize,
        best: ExperimentKey,
        /// Whether the best-model pointer now names `best`.
        pointer_advanced: bool,
    },
}

/// Runs sync cycles against one store, local cache and leaderboard.
pub struct SyncCycle {
    layout: LocalLayout,
    engine: SyncEngine,
    pool: FetchPool,
    leaderboard: Arc<dyn LeaderboardStore>,
}

impl SyncCycle {
    pub fn new(
        layout: LocalLayout,
        store: Arc<dyn ArtifactStore>,
        leaderboard: Arc<dyn LeaderboardStore>,
        fetch: FetchPoolConfig,
    ) -> Self {
        Self {
            engine: SyncEngine::new(Arc::clone(&store), layout.clone(), fetch.timeout),
            pool: FetchPool::new(store, fetch),
            layout,
            leaderboard,
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &LocalLayout {
        &self.layout
    }

    /// Runs one cycle, updating `state` as it goes.
    ///
    /// On error `state.pending_publish` stays set so the next cycle retries
    /// the publish even if no new records arrive.
    pub async fn run(&self, state: &mut TrackerState) -> Result<CycleReport, CycleError> {
        let sync = self.engine.sync_metrics(&mut state.watermark).await?;
        // coarse file timestamps can tie with the watermark
        if sync.advanced || sync.fetched > 0 {
            state.pending_publish = true;
        }
        if !state.pending_publish {
            return Ok(CycleReport::Unchanged { sync });
        }

        let Some(aggregate) = aggregate(&self.layout)
            .await
            .map_err(CycleError::Aggregate)?
        else {
            info!("No metric records yet, nothing to publish");
            state.pending_publish = false;
            return Ok(CycleReport::NoData { sync });
        };

        if let Err(error) = write_tables(&self.layout, &aggregate).await {
            warn!("Failed to write aggregate tables: {error}");
        }

        let rows: Vec<LeaderboardRow> = aggregate
            .leaderboard
            .iter()
            .map(LeaderboardRow::from)
            .collect();
        publish_leaderboard(self.leaderboard.as_ref(), &rows).await?;

        let pointer_advanced = self.fetch_and_point(&aggregate).await?;
        state.pending_publish = !pointer_advanced;

        Ok(CycleReport::Published {
            sync,
            contributors: rows.len(),
            best: aggregate.global_best().key.clone(),
            pointer_advanced,
        })
    }

    /// Fetches every winner's serving artifacts, then moves the pointer to
    /// the global best if all of its artifacts are present.
    async fn fetch_and_point(&self, aggregate: &Aggregate) -> Result<bool, CycleError> {
        let tasks: Vec<FetchTask> = aggregate
            .leaderboard
            .iter()
            .flat_map(|entry| entry.record.key.serving_artifacts())
            .map(|remote| {
                let local = self.layout.resolve(&remote);
                FetchTask::new(remote, local)
            })
            .collect();

        let report = self.pool.run(tasks).await;

        let best = aggregate.global_best();
        if !self.artifacts_present(&best.key).await {
            warn!(
                model = %best.key,
                failed = report.failed.len(),
                "Best model artifacts incomplete, keeping previous pointer"
            );
            return Ok(false);
        }

        BestModelPointer::for_record(best)
            .write(&self.layout.best_model_pointer())
            .await?;
        info!(model = %best.key, accuracy = best.accuracy(), "Best model pointer updated");
        Ok(true)
    }

    async fn artifacts_present(&self, key: &ExperimentKey) -> bool {
        for remote in key.serving_artifacts() {
            let local = self.layout.resolve(&remote);
            if !tokio::fs::try_exists(&local).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    use artifact_sync::ObjectArtifactStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use database::{LeaderboardTransaction, MemoryLeaderboard};
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectStorePath;
    use object_store::{ObjectStore, ObjectStoreExt};

    use super::*;

    const RECORD_95: &str = r#"{"trainable_parameters":10,"execution_time":2.0,"loss":0.1,"accuracy":0.95,"model_size":40,"learning_rate":0.01,"batch_size":8,"epochs":3,"optimizer":"adam"}"#;

    /// Leaderboard whose commits fail while `fail` is set.
    struct FailingCommitStore {
        inner: MemoryLeaderboard,
        fail: AtomicBool,
    }

    struct FailingCommit {
        inner: Box<dyn LeaderboardTransaction>,
        fail: bool,
    }

    #[async_trait]
    impl LeaderboardStore for FailingCommitStore {
        async fn begin(&self) -> Result<Box<dyn LeaderboardTransaction>, PublishError> {
            Ok(Box::new(FailingCommit {
                inner: self.inner.begin().await?,
                fail: self.fail.load(Ordering::SeqCst),
            }))
        }

        async fn browse(&self, limit: Option<usize>) -> Result<Vec<LeaderboardRow>, PublishError> {
            self.inner.browse(limit).await
        }
    }

    #[async_trait]
    impl LeaderboardTransaction for FailingCommit {
        async fn delete_all(&mut self) -> Result<u64, PublishError> {
            self.inner.delete_all().await
        }

        async fn insert(&mut self, row: &LeaderboardRow) -> Result<(), PublishError> {
            self.inner.insert(row).await
        }

        async fn commit(self: Box<Self>) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Backend("injected commit failure".to_owned()));
            }
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), PublishError> {
            self.inner.rollback().await
        }
    }

    async fn put(store: &InMemory, path: &str, body: &str) {
        store
            .put(
                &ObjectStorePath::from(path),
                Bytes::from(body.to_owned()).into(),
            )
            .await
            .expect("put");
    }

    async fn seeded_store() -> Arc<InMemory> {
        let store = Arc::new(InMemory::new());
        put(&store, "alice/e1/cnn_model_metrics.json", RECORD_95).await;
        put(&store, "alice/e1/cnn.safetensors", "weights").await;
        put(&store, "alice/e1/cnn_train_history.json", "{}").await;
        put(&store, "alice/e1/data_details.json", "{}").await;
        store
    }

    fn cycle(
        store: Arc<dyn ObjectStore>,
        root: &Path,
        leaderboard: Arc<dyn LeaderboardStore>,
    ) -> SyncCycle {
        let artifacts = ObjectArtifactStore::new(store, ObjectStorePath::default());
        SyncCycle::new(
            LocalLayout::new(root),
            Arc::new(artifacts),
            leaderboard,
            FetchPoolConfig {
                workers: 4,
                timeout: Duration::from_secs(5),
                retries: 0,
                min_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_first_cycle_publishes_and_points() {
        let dir = tempfile::tempdir().expect("tempdir");
        let leaderboard = Arc::new(MemoryLeaderboard::default());
        let cycle = cycle(seeded_store().await, dir.path(), leaderboard.clone());
        let mut state = TrackerState::default();

        let report = cycle.run(&mut state).await.expect("cycle");

        let CycleReport::Published {
            contributors,
            best,
            pointer_advanced,
            ..
        } = report
        else {
            panic!("expected a publish, got {report:?}");
        };
        assert_eq!(contributors, 1);
        assert_eq!(best, ExperimentKey::new("alice", "e1", "cnn"));
        assert!(pointer_advanced);
        assert!(!state.pending_publish);

        let pointer = BestModelPointer::read(&cycle.layout().best_model_pointer())
            .await
            .expect("read pointer")
            .expect("pointer written");
        assert_eq!(pointer.key, best);
        assert!(cycle.layout().model_path(&best).exists());
        assert!(cycle.layout().leaderboard_table().exists());
        assert_eq!(leaderboard.browse(None).await.expect("browse").len(), 1);
    }

    #[tokio::test]
    async fn test_quiet_cycle_is_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cycle = cycle(
            seeded_store().await,
            dir.path(),
            Arc::new(MemoryLeaderboard::default()),
        );
        let mut state = TrackerState::default();
        cycle.run(&mut state).await.expect("first cycle");

        let report = cycle.run(&mut state).await.expect("second cycle");

        assert!(matches!(report, CycleReport::Unchanged { ref sync } if sync.fetched == 0));
    }

    #[tokio::test]
    async fn test_empty_store_is_no_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cycle = cycle(
            Arc::new(InMemory::new()),
            dir.path(),
            Arc::new(MemoryLeaderboard::default()),
        );
        let mut state = TrackerState::default();

        let report = cycle.run(&mut state).await.expect("cycle");

        assert!(matches!(report, CycleReport::NoData { .. }));
        assert!(!state.pending_publish);
        assert!(!cycle.layout().best_model_pointer().exists());
    }

    #[tokio::test]
    async fn test_missing_best_artifact_keeps_pointer_pending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(InMemory::new());
        put(&store, "alice/e1/cnn_model_metrics.json", RECORD_95).await;
        put(&store, "alice/e1/data_details.json", "{}").await;
        let cycle = cycle(store, dir.path(), Arc::new(MemoryLeaderboard::default()));
        let mut state = TrackerState::default();

        let report = cycle.run(&mut state).await.expect("cycle");

        assert!(matches!(
            report,
            CycleReport::Published {
                pointer_advanced: false,
                ..
            }
        ));
        assert!(state.pending_publish);
        assert!(!cycle.layout().best_model_pointer().exists());
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried_next_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let leaderboard = Arc::new(FailingCommitStore {
            inner: MemoryLeaderboard::default(),
            fail: AtomicBool::new(true),
        });
        let cycle = cycle(seeded_store().await, dir.path(), leaderboard.clone());
        let mut state = TrackerState::default();

        let error = cycle.run(&mut state).await.expect_err("commit fails");
        assert!(matches!(error, CycleError::Publish(_)));
        assert!(state.pending_publish);
        assert!(!cycle.layout().best_model_pointer().exists());

        leaderboard.fail.store(false, Ordering::SeqCst);
        let report = cycle.run(&mut state).await.expect("retry");

        // nothing new was synced, the retry comes from the pending flag
        assert!(matches!(
            report,
            CycleReport::Published { ref sync, .. } if sync.fetched == 0
        ));
        assert_eq!(leaderboard.inner.browse(None).await.expect("browse").len(), 1);
    }
}
