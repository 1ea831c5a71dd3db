//! `PostgreSQL` leaderboard table.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{LeaderboardRow, LeaderboardStore, LeaderboardTransaction, PublishError};

/// Leaderboard stored in the `leaderboard` table.
#[derive(Debug, Clone)]
pub struct PgLeaderboard {
    pool: PgPool,
}

impl PgLeaderboard {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgLeaderboardTransaction {
    transaction: Transaction<'static, Postgres>,
}

#[async_trait]
impl LeaderboardStore for PgLeaderboard {
    async fn begin(&self) -> Result<Box<dyn LeaderboardTransaction>, PublishError> {
        let transaction = self.pool.begin().await?;
        Ok(Box::new(PgLeaderboardTransaction { transaction }))
    }

    async fn browse(&self, limit: Option<usize>) -> Result<Vec<LeaderboardRow>, PublishError> {
        // LIMIT NULL is LIMIT ALL
        let limit = limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = sqlx::query_as::<_, LeaderboardRow>(
            r"
            SELECT contributor_id, experiment_id, model_name, trainable_parameters,
                   execution_time, loss, accuracy, model_size, learning_rate,
                   batch_size, epochs, optimizer
            FROM leaderboard
            ORDER BY accuracy DESC, contributor_id
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl LeaderboardTransaction for PgLeaderboardTransaction {
    async fn delete_all(&mut self) -> Result<u64, PublishError> {
        let result = sqlx::query("DELETE FROM leaderboard")
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert(&mut self, row: &LeaderboardRow) -> Result<(), PublishError> {
        let result = sqlx::query(
            r"
            INSERT INTO leaderboard (
                contributor_id, experiment_id, model_name, trainable_parameters,
                execution_time, loss, accuracy, model_size, learning_rate,
                batch_size, epochs, optimizer
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(&row.contributor_id)
        .bind(&row.experiment_id)
        .bind(&row.model_name)
        .bind(row.trainable_parameters)
        .bind(row.execution_time)
        .bind(row.loss)
        .bind(row.accuracy)
        .bind(row.model_size)
        .bind(row.learning_rate)
        .bind(row.batch_size)
        .bind(row.epochs)
        .bind(&row.optimizer)
        .execute(&mut *self.transaction)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => Err(
                PublishError::DuplicateContributor(row.contributor_id.clone()),
            ),
            Err(error) => Err(error.into()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), PublishError> {
        self.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PublishError> {
        self.transaction.rollback().await?;
        Ok(())
    }
}
