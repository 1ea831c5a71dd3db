//! End-to-end sync cycles over an in-memory store and leaderboard.

use core::time::Duration;
use std::sync::Arc;

use artifact_sync::{FetchPoolConfig, ObjectArtifactStore};
use bytes::Bytes;
use database::{LeaderboardStore, MemoryLeaderboard};
use experiment_structs::{DataDetails, ExperimentKey, LocalLayout};
use experiment_tracker::pipeline::{CycleReport, SyncCycle, TrackerState};
use model_serving::{DenseClassifier, ModelGuard, SafetensorsLoader};
use object_store::ObjectStoreExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectStorePath;

struct Harness {
    store: Arc<InMemory>,
    leaderboard: Arc<MemoryLeaderboard>,
    cycle: SyncCycle,
    state: TrackerState,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(InMemory::new());
        let leaderboard = Arc::new(MemoryLeaderboard::default());
        let cycle = SyncCycle::new(
            LocalLayout::new(dir.path()),
            Arc::new(ObjectArtifactStore::new(
                store.clone(),
                ObjectStorePath::default(),
            )),
            leaderboard.clone(),
            FetchPoolConfig {
                workers: 8,
                timeout: Duration::from_secs(5),
                retries: 0,
                ..FetchPoolConfig::default()
            },
        );

        Self {
            store,
            leaderboard,
            cycle,
            state: TrackerState::default(),
            _dir: dir,
        }
    }

    async fn put(&self, path: &str, body: Vec<u8>) {
        self.store
            .put(&ObjectStorePath::from(path), Bytes::from(body).into())
            .await
            .expect("put");
    }

    /// Uploads a complete experiment whose model always predicts `labels[winner]`.
    async fn upload(&self, key: &ExperimentKey, accuracy: f64, labels: &[&str], winner: usize) {
        let metrics = format!(
            r#"{{"trainable_parameters":128,"execution_time":42.0,"loss":0.3,"accuracy":{accuracy},"model_size":512,"learning_rate":0.001,"batch_size":32,"epochs":10,"optimizer":"adam"}}"#
        );

        let mut bias = vec![0.0; labels.len()];
        bias[winner] = 5.0;
        let model = DenseClassifier::new(vec![0.0; labels.len()], bias, 1).expect("model");
        let details = DataDetails::from_labels(labels.iter().copied());

        self.put(&key.model_path(), model.to_safetensors().expect("serialize"))
            .await;
        self.put(&key.train_history_path(), b"{\"loss\":[0.9,0.3]}".to_vec())
            .await;
        self.put(
            &key.data_details_path(),
            serde_json::to_vec(&details).expect("details"),
        )
        .await;
        // metrics last, as the training job does
        self.put(&key.metrics_path(), metrics.into_bytes()).await;
    }

    async fn run(&mut self) -> CycleReport {
        self.cycle.run(&mut self.state).await.expect("cycle")
    }

    async fn published(&self) -> Vec<(String, String, f64)> {
        self.leaderboard
            .browse(None)
            .await
            .expect("browse")
            .into_iter()
            .map(|row| (row.contributor_id, row.experiment_id, row.accuracy))
            .collect()
    }
}

fn row(contributor: &str, experiment: &str, accuracy: f64) -> (String, String, f64) {
    (contributor.to_owned(), experiment.to_owned(), accuracy)
}

#[tokio::test]
async fn test_new_best_record_replaces_contributor_row() {
    let mut harness = Harness::new();
    let labels = ["chanterelle", "morel"];
    harness
        .upload(&ExperimentKey::new("alice", "e1", "cnn"), 0.80, &labels, 0)
        .await;
    harness
        .upload(&ExperimentKey::new("bob", "e1", "cnn"), 0.95, &labels, 0)
        .await;
    harness
        .upload(&ExperimentKey::new("carol", "e1", "cnn"), 0.90, &labels, 0)
        .await;

    let first = harness.run().await;
    assert!(matches!(
        first,
        CycleReport::Published { ref best, pointer_advanced: true, .. }
            if best.contributor_id == "bob"
    ));
    assert_eq!(
        harness.published().await,
        vec![
            row("bob", "e1", 0.95),
            row("carol", "e1", 0.90),
            row("alice", "e1", 0.80),
        ]
    );

    harness
        .upload(&ExperimentKey::new("bob", "e2", "resnet"), 0.99, &labels, 1)
        .await;

    let second = harness.run().await;
    assert!(matches!(
        second,
        CycleReport::Published { ref sync, contributors: 3, .. } if sync.fetched == 1
    ));
    assert_eq!(
        harness.published().await,
        vec![
            row("bob", "e2", 0.99),
            row("carol", "e1", 0.90),
            row("alice", "e1", 0.80),
        ]
    );

    assert!(matches!(harness.run().await, CycleReport::Unchanged { .. }));
}

#[tokio::test]
async fn test_serving_follows_published_best() {
    let mut harness = Harness::new();
    let labels = ["chanterelle", "morel", "porcini"];
    let first_best = ExperimentKey::new("alice", "e1", "cnn");
    let second_best = ExperimentKey::new("dave", "e4", "vit");
    harness.upload(&first_best, 0.91, &labels, 2).await;
    harness.run().await;

    let guard = ModelGuard::new(
        harness.cycle.layout().clone(),
        Arc::new(SafetensorsLoader),
    );
    let before = guard.predict(&[1.0]).await.expect("predict");
    assert_eq!(before.model, first_best);
    assert_eq!(before.label, "porcini");

    harness.upload(&second_best, 0.97, &labels, 1).await;
    harness.run().await;

    let after = guard.predict(&[1.0]).await.expect("predict");
    assert_eq!(after.model, second_best);
    assert_eq!(after.label, "morel");
    assert!(after.confidence > 90.0);
}
