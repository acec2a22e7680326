//! Batch output files.
//!
//! A committed batch lands in `videos_<partition>_<first>-<last>.json`, where
//! the range is 1-based and inclusive. An interrupted batch is kept as
//! `videos_<partition>_<first>-<last>.partial.json` until the batch is
//! completed by a later run. A committed file is never rewritten.

use crate::error::{Error, Result};
use crate::types::{BatchRange, ChannelVideos};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Destination for batch results
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Durably write the full output of a completed batch
    async fn write_batch(
        &self,
        partition: &str,
        range: BatchRange,
        entries: &[ChannelVideos],
    ) -> Result<PathBuf>;

    /// Persist what an interrupted batch accumulated
    async fn write_partial(
        &self,
        partition: &str,
        range: BatchRange,
        entries: &[ChannelVideos],
    ) -> Result<PathBuf>;
}

/// Writes batches as pretty-printed JSON arrays
#[derive(Clone, Debug)]
pub struct JsonBatchSink {
    dir: PathBuf,
}

impl JsonBatchSink {
    /// Write batch files under `dir` (created on first write)
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File of a committed batch
    pub fn batch_path(&self, partition: &str, range: BatchRange) -> PathBuf {
        self.dir
            .join(format!("videos_{partition}_{}.json", range.label()))
    }

    /// File of an interrupted batch
    pub fn partial_path(&self, partition: &str, range: BatchRange) -> PathBuf {
        self.dir
            .join(format!("videos_{partition}_{}.partial.json", range.label()))
    }

    async fn write_atomic(&self, path: &Path, entries: &[ChannelVideos]) -> Result<()> {
        let context =
            |e: std::io::Error| Error::Output(format!("failed to write {}: {e}", path.display()));

        tokio::fs::create_dir_all(&self.dir).await.map_err(context)?;

        let body = serde_json::to_vec_pretty(entries)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        write_synced(&tmp, &body).await.map_err(context)?;
        tokio::fs::rename(&tmp, path).await.map_err(context)?;
        Ok(())
    }
}

/// Write `body` to `path` and flush it to disk before returning
pub(crate) async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

#[async_trait]
impl BatchSink for JsonBatchSink {
    async fn write_batch(
        &self,
        partition: &str,
        range: BatchRange,
        entries: &[ChannelVideos],
    ) -> Result<PathBuf> {
        let path = self.batch_path(partition, range);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::warn!(
                partition,
                path = %path.display(),
                "Batch already committed, keeping existing file"
            );
        } else {
            self.write_atomic(&path, entries).await?;
            tracing::info!(
                partition,
                range = %range,
                entries = entries.len(),
                path = %path.display(),
                "Batch written"
            );
        }

        let partial = self.partial_path(partition, range);
        match tokio::fs::remove_file(&partial).await {
            Ok(()) => tracing::debug!(path = %partial.display(), "Removed superseded partial batch"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %partial.display(), error = %e, "Could not remove partial batch"),
        }

        Ok(path)
    }

    async fn write_partial(
        &self,
        partition: &str,
        range: BatchRange,
        entries: &[ChannelVideos],
    ) -> Result<PathBuf> {
        let path = self.partial_path(partition, range);
        self.write_atomic(&path, entries).await?;
        tracing::info!(
            partition,
            range = %range,
            entries = entries.len(),
            path = %path.display(),
            "Partial batch written"
        );
        Ok(path)
    }
}
