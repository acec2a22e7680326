//! Durable per-partition progress.
//!
//! A checkpoint records how many leading items of a partition are fully
//! processed. Loading never fails: a missing or unreadable checkpoint is the
//! initial state (offset 0). Saving reports errors, and the batch runner logs
//! them and carries on.
//!
//! Two backends are provided:
//! - [`FileCheckpointStore`] writes `checkpoint_<partition>.json` files
//! - [`SqliteCheckpointStore`] keeps one row per partition in SQLite

mod file;
mod sqlite;

pub use file::FileCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use crate::config::{CheckpointBackend, StorageConfig};
use crate::error::Result;
use crate::types::CheckpointState;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for [`CheckpointState`]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last saved state for `partition`, or the initial state
    async fn load(&self, partition: &str) -> CheckpointState;

    /// Persist `state` under `state.partition`
    async fn save(&self, state: &CheckpointState) -> Result<()>;

    /// Forget the checkpoint of `partition`
    async fn clear(&self, partition: &str) -> Result<()>;
}

/// Open the backend selected in the storage configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = match config.checkpoint_backend {
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(&config.checkpoint_dir)),
        CheckpointBackend::Sqlite => Arc::new(SqliteCheckpointStore::new(&config.sqlite_path).await?),
    };
    tracing::debug!(backend = ?config.checkpoint_backend, "Checkpoint store opened");
    Ok(store)
}
