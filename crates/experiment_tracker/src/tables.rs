//! CSV snapshots of the aggregation written next to the local cache.

use std::io;
use std::path::Path;

use database::LeaderboardRow;
use experiment_structs::{LocalLayout, write_atomic};
use tracing::debug;

use crate::aggregate::Aggregate;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to access table: {0}")]
    Io(#[from] io::Error),
}

/// Writes `all_models_metrics.csv` and `leaderboard.csv`.
///
/// Each file is replaced atomically.
pub async fn write_tables(layout: &LocalLayout, aggregate: &Aggregate) -> Result<(), TableError> {
    let all = to_csv(aggregate.records.iter().map(LeaderboardRow::from))?;
    write_atomic(&layout.all_metrics_table(), all).await?;

    let ranked = to_csv(aggregate.leaderboard.iter().map(LeaderboardRow::from))?;
    write_atomic(&layout.leaderboard_table(), ranked).await?;

    debug!(
        records = aggregate.records.len(),
        contributors = aggregate.leaderboard.len(),
        "Wrote aggregate tables"
    );
    Ok(())
}

/// Reads the last written `leaderboard.csv`, best first.
///
/// Returns an empty list if no table has been written yet.
pub async fn read_leaderboard_table(layout: &LocalLayout) -> Result<Vec<LeaderboardRow>, TableError> {
    read_rows(&layout.leaderboard_table()).await
}

async fn read_rows(path: &Path) -> Result<Vec<LeaderboardRow>, TableError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    let rows = csv::Reader::from_reader(bytes.as_slice())
        .deserialize()
        .collect::<Result<Vec<LeaderboardRow>, _>>()?;
    Ok(rows)
}

fn to_csv(rows: impl IntoIterator<Item = LeaderboardRow>) -> Result<Vec<u8>, TableError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|error| TableError::Io(error.into_error()))
}

#[cfg(test)]
mod tests {
    use experiment_structs::{ExperimentKey, MetricRecord, ModelMetrics};

    use super::*;

    fn record(contributor: &str, experiment: &str, accuracy: f64) -> MetricRecord {
        MetricRecord::new(
            ExperimentKey::new(contributor, experiment, "vgg"),
            ModelMetrics {
                trainable_parameters: 1_000.0,
                execution_time: 30.5,
                loss: 0.4,
                accuracy,
                model_size: 2_048.0,
                learning_rate: 0.01,
                batch_size: 32.0,
                epochs: 10.0,
                optimizer: "sgd".to_owned(),
            },
        )
    }

    #[tokio::test]
    async fn test_tables_hold_all_records_and_ranking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = LocalLayout::new(dir.path());
        let aggregate = Aggregate::from_records(vec![
            record("alice", "e1", 0.80),
            record("alice", "e2", 0.95),
            record("bob", "e1", 0.90),
        ])
        .expect("records");

        write_tables(&layout, &aggregate).await.expect("write tables");

        let all = std::fs::read_to_string(layout.all_metrics_table()).expect("read");
        assert!(all.starts_with("contributor_id,experiment_id,model_name,"));
        assert_eq!(all.lines().count(), 4);

        let ranked = read_leaderboard_table(&layout).await.expect("read table");
        let order: Vec<(&str, &str)> = ranked
            .iter()
            .map(|row| (row.contributor_id.as_str(), row.experiment_id.as_str()))
            .collect();
        assert_eq!(order, vec![("alice", "e2"), ("bob", "e1")]);
    }

    #[tokio::test]
    async fn test_missing_table_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rows = read_leaderboard_table(&LocalLayout::new(dir.path()))
            .await
            .expect("read");
        assert!(rows.is_empty());
    }
}
