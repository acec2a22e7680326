//! JSON file checkpoint backend.

use super::CheckpointStore;
use crate::error::{Error, Result};
use crate::output::write_synced;
use crate::types::CheckpointState;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One `checkpoint_<partition>.json` file per partition
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store checkpoints under `dir` (created on first save)
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Checkpoint file of a partition
    pub fn path_for(&self, partition: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{partition}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, partition: &str) -> CheckpointState {
        let path = self.path_for(partition);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(partition, "No checkpoint yet, starting at offset 0");
                return CheckpointState::initial(partition);
            }
            Err(e) => {
                tracing::warn!(
                    partition,
                    path = %path.display(),
                    error = %e,
                    "Checkpoint unreadable, starting at offset 0"
                );
                return CheckpointState::initial(partition);
            }
        };

        match serde_json::from_str::<CheckpointState>(&raw) {
            Ok(mut state) => {
                state.partition = partition.to_string();
                tracing::debug!(
                    partition,
                    offset = state.last_processed_offset,
                    "Checkpoint loaded"
                );
                state
            }
            Err(e) => {
                tracing::warn!(
                    partition,
                    path = %path.display(),
                    error = %e,
                    "Checkpoint corrupt, starting at offset 0"
                );
                CheckpointState::initial(partition)
            }
        }
    }

    async fn save(&self, state: &CheckpointState) -> Result<()> {
        let path = self.path_for(&state.partition);
        let context = |e: std::io::Error| {
            Error::Checkpoint(format!("failed to write {}: {e}", path.display()))
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(context)?;

        // Synced temp file next to the target, then rename: never a torn file
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)?;
        write_synced(&tmp, &body).await.map_err(context)?;
        tokio::fs::rename(&tmp, &path).await.map_err(context)?;

        tracing::debug!(
            partition = %state.partition,
            offset = state.last_processed_offset,
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn clear(&self, partition: &str) -> Result<()> {
        let path = self.path_for(partition);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Checkpoint(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}
