//! SQLite checkpoint backend.

use super::CheckpointStore;
use crate::error::{Error, Result};
use crate::types::CheckpointState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Checkpoints kept in a `checkpoints` table, one row per partition
#[derive(Clone, Debug)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (or create) the database at `path` and ensure the schema
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Checkpoint(format!("failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                partition TEXT PRIMARY KEY NOT NULL,
                last_processed_offset INTEGER NOT NULL,
                total_items INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn fetch(&self, partition: &str) -> Result<Option<CheckpointState>> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT last_processed_offset, total_items, updated_at
            FROM checkpoints WHERE partition = ?
            "#,
        )
        .bind(partition)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(offset, total, updated_at)| CheckpointState {
            partition: partition.to_string(),
            last_processed_offset: usize::try_from(offset).unwrap_or(0),
            total_items: usize::try_from(total).unwrap_or(0),
            updated_at: DateTime::<Utc>::from_timestamp(updated_at, 0),
        }))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, partition: &str) -> CheckpointState {
        match self.fetch(partition).await {
            Ok(Some(state)) => state,
            Ok(None) => CheckpointState::initial(partition),
            Err(e) => {
                tracing::warn!(partition, error = %e, "Checkpoint unreadable, starting at offset 0");
                CheckpointState::initial(partition)
            }
        }
    }

    async fn save(&self, state: &CheckpointState) -> Result<()> {
        let updated_at = state.updated_at.unwrap_or_else(Utc::now).timestamp();
        sqlx::query(
            r#"
            INSERT INTO checkpoints (partition, last_processed_offset, total_items, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(partition) DO UPDATE SET
                last_processed_offset = excluded.last_processed_offset,
                total_items = excluded.total_items,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.partition)
        .bind(state.last_processed_offset as i64)
        .bind(state.total_items as i64)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Checkpoint(format!("failed to save checkpoint: {e}")))?;

        Ok(())
    }

    async fn clear(&self, partition: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE partition = ?")
            .bind(partition)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Checkpoint(format!("failed to clear checkpoint: {e}")))?;
        Ok(())
    }
}
