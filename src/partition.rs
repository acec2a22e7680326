//! Partition input: the ordered channel list of one partition.

use crate::error::{Error, Result};
use crate::types::ChannelRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Source of a partition's ordered channel list
///
/// The list must be stable between runs; checkpoints are offsets into it.
#[async_trait]
pub trait ChannelLister: Send + Sync {
    /// Channels of `partition`, in processing order
    async fn list_channels(&self, partition: &str) -> Result<Vec<ChannelRecord>>;
}

/// Reject keys that cannot safely name files
///
/// Keys are made of ASCII letters, digits, `-` and `_` (e.g. `united-states`).
pub fn validate_partition_key(partition: &str) -> Result<()> {
    let valid = !partition.is_empty()
        && partition
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPartition(format!(
            "partition key {partition:?} must be non-empty and use only letters, digits, '-' or '_'"
        )))
    }
}

/// Reads `top_1000_<partition>.json` listings produced by the channel scraper
#[derive(Clone, Debug)]
pub struct JsonChannelLister {
    dir: PathBuf,
}

impl JsonChannelLister {
    /// Read listings from `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Listing file of a partition
    pub fn path_for(&self, partition: &str) -> PathBuf {
        self.dir.join(format!("top_1000_{partition}.json"))
    }
}

#[async_trait]
impl ChannelLister for JsonChannelLister {
    async fn list_channels(&self, partition: &str) -> Result<Vec<ChannelRecord>> {
        validate_partition_key(partition)?;
        let path = self.path_for(partition);

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::InvalidPartition(format!("cannot read {}: {e}", path.display()))
        })?;
        let channels: Vec<ChannelRecord> = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidPartition(format!("cannot parse {}: {e}", path.display()))
        })?;

        if channels.is_empty() {
            return Err(Error::InvalidPartition(format!(
                "{} lists no channels",
                path.display()
            )));
        }

        tracing::debug!(partition, channels = channels.len(), "Partition listing loaded");
        Ok(channels)
    }
}
