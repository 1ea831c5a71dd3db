//! In-process leaderboard with the same transaction contract as Postgres.
//!
//! Used when no database is configured and by tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::leaderboard::sort_by_accuracy;
use crate::{LeaderboardRow, LeaderboardStore, LeaderboardTransaction, PublishError};

#[derive(Debug, Clone, Default)]
pub struct MemoryLeaderboard {
    committed: Arc<RwLock<Vec<LeaderboardRow>>>,
}

struct MemoryTransaction {
    committed: Arc<RwLock<Vec<LeaderboardRow>>>,
    staged: Vec<LeaderboardRow>,
}

#[async_trait]
impl LeaderboardStore for MemoryLeaderboard {
    async fn begin(&self) -> Result<Box<dyn LeaderboardTransaction>, PublishError> {
        let staged = self.committed.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            committed: Arc::clone(&self.committed),
            staged,
        }))
    }

    async fn browse(&self, limit: Option<usize>) -> Result<Vec<LeaderboardRow>, PublishError> {
        let mut rows = self.committed.read().await.clone();
        sort_by_accuracy(&mut rows);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[async_trait]
impl LeaderboardTransaction for MemoryTransaction {
    async fn delete_all(&mut self) -> Result<u64, PublishError> {
        let deleted = self.staged.len() as u64;
        self.staged.clear();
        Ok(deleted)
    }

    async fn insert(&mut self, row: &LeaderboardRow) -> Result<(), PublishError> {
        if self
            .staged
            .iter()
            .any(|existing| existing.contributor_id == row.contributor_id)
        {
            return Err(PublishError::DuplicateContributor(
                row.contributor_id.clone(),
            ));
        }
        self.staged.push(row.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PublishError> {
        let Self { committed, staged } = *self;
        *committed.write().await = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PublishError> {
        Ok(())
    }
}
