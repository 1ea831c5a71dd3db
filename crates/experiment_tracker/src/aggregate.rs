//! Ranking of the locally cached metric records.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use experiment_structs::{
    ExperimentKey, LeaderboardEntry, LocalLayout, METRICS_SUFFIX, MetricRecord, ModelMetrics,
};
use tracing::{debug, warn};

/// Every usable metric record plus the per-contributor ranking built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// All parsed records, ordered by key.
    pub records: Vec<MetricRecord>,
    /// One entry per contributor, best first.
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl Aggregate {
    /// Builds the aggregate, or `None` if there are no records.
    #[must_use]
    pub fn from_records(mut records: Vec<MetricRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));
        let leaderboard = rank(&records);
        Some(Self {
            records,
            leaderboard,
        })
    }

    /// The rank-1 record.
    #[must_use]
    pub fn global_best(&self) -> &MetricRecord {
        // never empty, see `from_records`
        &self.leaderboard[0].record
    }
}

/// Reads and ranks every metric record under the local root.
///
/// Returns `None` when the cache holds no usable record.
pub async fn aggregate(layout: &LocalLayout) -> io::Result<Option<Aggregate>> {
    let records = load_records(layout).await?;
    Ok(Aggregate::from_records(records))
}

/// Parses every `{contributor}/{experiment}/{model}_model_metrics.json`
/// under the local root.
///
/// Unreadable or malformed records are logged and left out, as are
/// directories below the root that cannot be listed.
pub async fn load_records(layout: &LocalLayout) -> io::Result<Vec<MetricRecord>> {
    let contributors = match list_dir(layout.root()).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };

    let mut records = Vec::new();
    for contributor in contributors.into_iter().filter(|entry| entry.is_dir) {
        for experiment in listing(&contributor.path).await {
            if !experiment.is_dir {
                continue;
            }

            for file in listing(&experiment.path).await {
                if file.is_dir || !file.name.ends_with(METRICS_SUFFIX) {
                    continue;
                }

                let relative = format!("{}/{}/{}", contributor.name, experiment.name, file.name);
                let Some(key) = ExperimentKey::from_metrics_path(&relative) else {
                    continue;
                };

                match read_metrics(&file.path).await {
                    Ok(metrics) => records.push(MetricRecord::new(key, metrics)),
                    Err(error) => warn!(record = %key, "Excluding metric record: {error}"),
                }
            }
        }
    }

    debug!(records = records.len(), "Loaded metric records");
    Ok(records)
}

async fn read_metrics(path: &Path) -> anyhow::Result<ModelMetrics> {
    let bytes = tokio::fs::read(path).await?;
    Ok(ModelMetrics::from_json(&bytes)?)
}

struct DirEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

async fn list_dir(path: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = tokio::fs::read_dir(path).await?;

    let mut listed = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        listed.push(DirEntry {
            name,
            path: entry.path(),
            is_dir: entry.file_type().await?.is_dir(),
        });
    }
    Ok(listed)
}

/// Lists a directory below the root, treating an unreadable one as empty.
async fn listing(path: &Path) -> Vec<DirEntry> {
    list_dir(path).await.unwrap_or_else(|error| {
        warn!(path = %path.display(), "Skipping unreadable directory: {error}");
        Vec::new()
    })
}

/// Picks each contributor's best record and orders the winners best first.
///
/// Equal accuracies are decided by key order, smallest key first, so the
/// result does not depend on the order of `records`.
#[must_use]
pub fn rank(records: &[MetricRecord]) -> Vec<LeaderboardEntry> {
    let mut best: BTreeMap<&str, &MetricRecord> = BTreeMap::new();

    for record in records {
        best.entry(record.key.contributor_id.as_str())
            .and_modify(|current| {
                if ranks_before(record, current) {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut winners: Vec<&MetricRecord> = best.into_values().collect();
    winners.sort_by(|a, b| {
        b.accuracy()
            .total_cmp(&a.accuracy())
            .then_with(|| a.key.cmp(&b.key))
    });

    winners
        .into_iter()
        .enumerate()
        .map(|(index, record)| LeaderboardEntry {
            rank: index + 1,
            record: record.clone(),
        })
        .collect()
}

fn ranks_before(candidate: &MetricRecord, current: &MetricRecord) -> bool {
    candidate
        .accuracy()
        .total_cmp(&current.accuracy())
        .then_with(|| current.key.cmp(&candidate.key))
        .is_gt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(contributor: &str, experiment: &str, accuracy: f64) -> MetricRecord {
        MetricRecord::new(
            ExperimentKey::new(contributor, experiment, "cnn"),
            ModelMetrics {
                trainable_parameters: 100.0,
                execution_time: 10.0,
                loss: 0.2,
                accuracy,
                model_size: 400.0,
                learning_rate: 0.001,
                batch_size: 16.0,
                epochs: 5.0,
                optimizer: "adam".to_owned(),
            },
        )
    }

    fn contributors(entries: &[LeaderboardEntry]) -> Vec<(&str, usize)> {
        entries
            .iter()
            .map(|entry| (entry.record.key.contributor_id.as_str(), entry.rank))
            .collect()
    }

    #[test]
    fn test_ranks_best_per_contributor() {
        let records = vec![
            record("alice", "e1", 0.80),
            record("alice", "e2", 0.95),
            record("bob", "e1", 0.90),
        ];

        let leaderboard = rank(&records);

        assert_eq!(contributors(&leaderboard), vec![("alice", 1), ("bob", 2)]);
        assert_eq!(leaderboard[0].record.key.experiment_id, "e2");
    }

    #[test]
    fn test_ties_resolve_by_key() {
        let forward = vec![
            record("alice", "e2", 0.9),
            record("alice", "e1", 0.9),
            record("bob", "e1", 0.9),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let first = rank(&forward);
        let second = rank(&backward);

        assert_eq!(first, second);
        assert_eq!(first[0].record.key, ExperimentKey::new("alice", "e1", "cnn"));
        assert_eq!(contributors(&first), vec![("alice", 1), ("bob", 2)]);
    }

    #[test]
    fn test_empty_input_has_no_aggregate() {
        assert!(Aggregate::from_records(Vec::new()).is_none());
        assert!(rank(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_records_are_excluded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = LocalLayout::new(dir.path());
        let good = record("alice", "e1", 0.8);
        let bad = ExperimentKey::new("bob", "e1", "cnn");

        std::fs::create_dir_all(layout.experiment_dir(&good.key)).expect("mkdir");
        std::fs::create_dir_all(layout.experiment_dir(&bad)).expect("mkdir");
        std::fs::write(
            layout.metrics_path(&good.key),
            serde_json::to_vec(&good.metrics).expect("json"),
        )
        .expect("write");
        std::fs::write(layout.metrics_path(&bad), b"{\"accuracy\": 0.9").expect("write");
        std::fs::write(layout.data_details_path(&bad), b"{}").expect("write");

        let aggregate = aggregate(&layout)
            .await
            .expect("aggregate")
            .expect("one record");

        assert_eq!(aggregate.records, vec![good.clone()]);
        assert_eq!(aggregate.global_best(), &good);
    }

    #[tokio::test]
    async fn test_unlistable_directory_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = LocalLayout::new(dir.path());
        let good = record("alice", "e1", 0.8);

        std::fs::create_dir_all(layout.experiment_dir(&good.key)).expect("mkdir");
        std::fs::write(
            layout.metrics_path(&good.key),
            serde_json::to_vec(&good.metrics).expect("json"),
        )
        .expect("write");

        let not_a_dir = dir.path().join("bob");
        std::fs::write(&not_a_dir, b"stray file").expect("write");
        assert!(listing(&not_a_dir).await.is_empty());
        assert!(listing(&dir.path().join("carol")).await.is_empty());

        let records = load_records(&layout).await.expect("load");
        assert_eq!(records, vec![good]);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = LocalLayout::new(dir.path().join("not-created"));

        assert!(aggregate(&layout).await.expect("aggregate").is_none());
    }
}
