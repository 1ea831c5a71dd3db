//! All-or-nothing replacement of the published leaderboard.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::LeaderboardRow;

/// Failure while reading or replacing the leaderboard.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate leaderboard row for contributor `{0}`")]
    DuplicateContributor(String),

    #[error("{0}")]
    Backend(String),
}

/// A store holding the published leaderboard.
///
/// Readers of [`LeaderboardStore::browse`] only ever observe committed content.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Opens a transaction over the leaderboard table.
    async fn begin(&self) -> Result<Box<dyn LeaderboardTransaction>, PublishError>;

    /// Returns committed rows ordered by accuracy, best first.
    ///
    /// `None` returns every row.
    async fn browse(&self, limit: Option<usize>) -> Result<Vec<LeaderboardRow>, PublishError>;
}

/// An open transaction on the leaderboard table.
///
/// Dropping a transaction without committing discards its changes.
#[async_trait]
pub trait LeaderboardTransaction: Send {
    /// Deletes every row, returning how many were visible to the transaction.
    async fn delete_all(&mut self) -> Result<u64, PublishError>;

    async fn insert(&mut self, row: &LeaderboardRow) -> Result<(), PublishError>;

    async fn commit(self: Box<Self>) -> Result<(), PublishError>;

    async fn rollback(self: Box<Self>) -> Result<(), PublishError>;
}

/// Replaces the leaderboard with `rows` as one atomic unit.
///
/// On any failure the transaction is rolled back and the previously
/// committed leaderboard stays authoritative.
///
/// # Errors
///
/// Returns the first error raised while replacing or committing.
pub async fn publish_leaderboard(
    store: &dyn LeaderboardStore,
    rows: &[LeaderboardRow],
) -> Result<usize, PublishError> {
    let mut transaction = store.begin().await?;

    match replace_rows(transaction.as_mut(), rows).await {
        Ok(()) => {
            transaction.commit().await?;
            info!(rows = rows.len(), "Published leaderboard");
            Ok(rows.len())
        }
        Err(error) => {
            warn!("Leaderboard publish failed, rolling back: {error}");
            if let Err(rollback_error) = transaction.rollback().await {
                warn!("Rollback failed: {rollback_error}");
            }
            Err(error)
        }
    }
}

async fn replace_rows(
    transaction: &mut dyn LeaderboardTransaction,
    rows: &[LeaderboardRow],
) -> Result<(), PublishError> {
    let deleted = transaction.delete_all().await?;
    debug!(deleted, "Cleared previous leaderboard rows");

    for row in rows {
        transaction.insert(row).await?;
    }

    Ok(())
}

/// Reads the committed leaderboard, best first.
///
/// A `limit` of zero returns every row.
pub async fn browse_leaderboard(
    store: &dyn LeaderboardStore,
    limit: usize,
) -> Result<Vec<LeaderboardRow>, PublishError> {
    store.browse((limit > 0).then_some(limit)).await
}

/// Orders rows best first; equal accuracies fall back to identity order.
pub(crate) fn sort_by_accuracy(rows: &mut [LeaderboardRow]) {
    rows.sort_by(|a, b| {
        b.accuracy
            .total_cmp(&a.accuracy)
            .then_with(|| a.contributor_id.cmp(&b.contributor_id))
    });
}
