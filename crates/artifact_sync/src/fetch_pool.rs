//! Bounded concurrent download of serving artifacts.

use core::time::Duration;
use std::path::PathBuf;
use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{ArtifactStore, TransferError};

/// One remote object to copy into the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub remote_path: String,
    pub local_path: PathBuf,
}

impl FetchTask {
    #[must_use]
    pub fn new(remote_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_path: local_path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchPoolConfig {
    /// Number of workers, and so the maximum number of fetches in flight.
    pub workers: usize,
    /// Upper bound on a single fetch attempt.
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: usize,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for FetchPoolConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            timeout: Duration::from_secs(120),
            retries: 2,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(u64),
    AlreadyPresent,
}

/// Result of draining a batch of [`FetchTask`]s.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: Vec<(FetchTask, TransferError)>,
}

impl FetchReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, task: FetchTask, result: Result<FetchOutcome, TransferError>) {
        match result {
            Ok(FetchOutcome::Fetched(_)) => self.fetched += 1,
            Ok(FetchOutcome::AlreadyPresent) => self.skipped += 1,
            Err(error) => {
                warn!(remote_path = %task.remote_path, "Fetch failed: {error}");
                self.failed.push((task, error));
            }
        }
    }
}

/// A fixed set of workers draining one shared queue of fetches.
///
/// A failing or hanging fetch only affects its own task.
pub struct FetchPool {
    store: Arc<dyn ArtifactStore>,
    config: FetchPoolConfig,
}

impl FetchPool {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, config: FetchPoolConfig) -> Self {
        Self { store, config }
    }

    /// Fetches every task, returning once all of them succeeded or failed.
    pub async fn run(&self, tasks: Vec<FetchTask>) -> FetchReport {
        let total = tasks.len();
        let (sender, receiver) = mpsc::unbounded_channel();
        for task in tasks {
            // the receiver is alive until the workers below finish
            let _ = sender.send(task);
        }
        drop(sender);

        let queue = Arc::new(Mutex::new(receiver));
        let workers = self.config.workers.clamp(1, total.max(1));
        let mut join_set = JoinSet::new();

        for worker in 0..workers {
            join_set.spawn(drain_queue(
                worker,
                Arc::clone(&queue),
                Arc::clone(&self.store),
                self.config,
            ));
        }

        let mut report = FetchReport::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(results) => {
                    for (task, result) in results {
                        report.record(task, result);
                    }
                }
                Err(join_error) => error!("Fetch worker panicked: {join_error}"),
            }
        }

        info!(
            total,
            workers,
            fetched = report.fetched,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Fetch pool drained"
        );

        report
    }
}

type TaskResult = (FetchTask, Result<FetchOutcome, TransferError>);

async fn drain_queue(
    worker: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<FetchTask>>>,
    store: Arc<dyn ArtifactStore>,
    config: FetchPoolConfig,
) -> Vec<TaskResult> {
    let mut results = Vec::new();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let result = fetch_one(store.as_ref(), &task, config).await;
        results.push((task, result));
    }

    debug!(worker, handled = results.len(), "Fetch worker finished");
    results
}

async fn fetch_one(
    store: &dyn ArtifactStore,
    task: &FetchTask,
    config: FetchPoolConfig,
) -> Result<FetchOutcome, TransferError> {
    if tokio::fs::try_exists(&task.local_path)
        .await
        .unwrap_or(false)
    {
        debug!(remote_path = %task.remote_path, "Artifact already present");
        return Ok(FetchOutcome::AlreadyPresent);
    }

    if let Some(parent) = task.local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TransferError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let attempt = || async {
        tokio::time::timeout(
            config.timeout,
            store.fetch(&task.remote_path, &task.local_path),
        )
        .await
        .map_err(|_| TransferError::Timeout {
            path: task.remote_path.clone(),
            timeout: config.timeout,
        })?
    };

    let written = attempt
        .retry(
            ExponentialBuilder::default()
                .with_max_times(config.retries)
                .with_min_delay(config.min_backoff)
                .with_max_delay(config.max_backoff),
        )
        .notify(|error: &TransferError, delay: Duration| {
            warn!(
                remote_path = %task.remote_path,
                "Fetch attempt failed, retrying in {delay:?}: {error}"
            );
        })
        .await?;

    Ok(FetchOutcome::Fetched(written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{CountingStore, memory_store};

    fn config(workers: usize) -> FetchPoolConfig {
        FetchPoolConfig {
            workers,
            timeout: Duration::from_millis(100),
            retries: 1,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn tasks(root: &std::path::Path, paths: &[&str]) -> Vec<FetchTask> {
        paths
            .iter()
            .map(|path| FetchTask::new(*path, root.join(path)))
            .collect()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(CountingStore::new(
            memory_store(&[
                ("a/e/m.safetensors", "a"),
                ("b/e/m.safetensors", "b"),
                ("c/e/m.safetensors", "c"),
            ])
            .await,
        ));
        let pool = FetchPool::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, config(2));

        let report = pool
            .run(tasks(
                dir.path(),
                &[
                    "a/e/m.safetensors",
                    "missing/e/m.safetensors",
                    "b/e/m.safetensors",
                    "c/e/m.safetensors",
                ],
            ))
            .await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
        assert_eq!(report.failed[0].0.remote_path, "missing/e/m.safetensors");
        // first attempt plus one retry
        assert_eq!(store.fetch_count("missing/e/m.safetensors"), 2);
        assert!(dir.path().join("c/e/m.safetensors").exists());
    }

    #[tokio::test]
    async fn test_hanging_fetch_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = CountingStore::new(
            memory_store(&[("a/e/m.safetensors", "a"), ("b/e/m.safetensors", "b")]).await,
        );
        store.hanging.push("a/e/m.safetensors".to_owned());
        let pool = FetchPool::new(Arc::new(store), config(1));

        let report = pool
            .run(tasks(dir.path(), &["a/e/m.safetensors", "b/e/m.safetensors"]))
            .await;

        assert_eq!(report.fetched, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].1,
            TransferError::Timeout { ref path, .. } if path == "a/e/m.safetensors"
        ));
        assert!(!dir.path().join("a/e/m.safetensors").exists());
        assert!(dir.path().join("b/e/m.safetensors").exists());
    }

    #[tokio::test]
    async fn test_present_artifacts_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("a/e/m.safetensors");
        std::fs::create_dir_all(local.parent().expect("parent")).expect("mkdir");
        std::fs::write(&local, "a").expect("seed");

        let store = Arc::new(CountingStore::new(
            memory_store(&[("a/e/m.safetensors", "a")]).await,
        ));
        let pool = FetchPool::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, config(4));

        let report = pool.run(tasks(dir.path(), &["a/e/m.safetensors"])).await;

        assert_eq!(report.skipped, 1);
        assert!(report.is_complete());
        assert_eq!(store.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = Arc::new(CountingStore::new(memory_store(&[]).await));
        let report = FetchPool::new(store, config(4)).run(Vec::new()).await;

        assert!(report.is_complete());
        assert_eq!(report.fetched + report.skipped, 0);
    }
}
