//! Core types for yt-harvest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used for videos whose category id is missing from the region's map
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// A channel handed over by the partition lister
///
/// Scraped rankings usually only know the display name and rank; the
/// identifier and the descriptive fields are filled in while harvesting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel identifier (`UC...`), absent until resolved
    #[serde(default, alias = "channel_id")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Rank within the partition's source listing
    #[serde(default)]
    pub rank: u32,
    /// Channel description
    #[serde(default)]
    pub description: Option<String>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Region code reported by the API
    #[serde(default)]
    pub region_code: Option<String>,
    /// Category assigned by the ranking site
    #[serde(default)]
    pub category: Option<String>,
    /// Channel page URL from the ranking site
    #[serde(default)]
    pub url: Option<String>,
    /// Subscriber count, known once the channel was looked up by id
    #[serde(default)]
    pub subscribers: Option<u64>,
    /// Number of public videos, known once the channel was looked up by id
    #[serde(default)]
    pub video_count: Option<u64>,
}

impl ChannelRecord {
    /// Create a record that only knows its name and rank
    pub fn named(name: impl Into<String>, rank: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            rank,
            description: None,
            thumbnail: None,
            region_code: None,
            category: None,
            url: None,
            subscribers: None,
            video_count: None,
        }
    }

    /// Create a record with a known identifier
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, rank: u32) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::named(name, rank)
        }
    }

    /// Identifier if present and non-empty
    pub fn channel_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// A single video built from one successful detail fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Video identifier
    pub video_id: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Human-readable category label
    pub category: String,
    /// Best available thumbnail URL
    pub thumbnail: Option<String>,
    /// Channel title
    pub author: String,
    /// Channel identifier
    pub author_id: String,
    /// View count
    pub views: u64,
    /// Like count (0 when hidden)
    pub likes: u64,
    /// Comment count (0 when disabled)
    pub comments: u64,
    /// Publication timestamp
    #[serde(alias = "date")]
    pub published_at: DateTime<Utc>,
}

impl std::fmt::Display for VideoRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.title, self.author)
    }
}

/// Thumbnail resolutions offered by the API, best first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSize {
    /// 1280x720
    Maxres,
    /// 640x480
    Standard,
    /// 480x360
    High,
    /// 320x180
    Medium,
    /// 120x90
    Default,
}

impl ThumbnailSize {
    /// Preference order used when picking a thumbnail
    pub const PREFERENCE: [ThumbnailSize; 5] = [
        ThumbnailSize::Maxres,
        ThumbnailSize::Standard,
        ThumbnailSize::High,
        ThumbnailSize::Medium,
        ThumbnailSize::Default,
    ];

    /// Key used in the API's `thumbnails` object
    pub fn as_key(&self) -> &'static str {
        match self {
            ThumbnailSize::Maxres => "maxres",
            ThumbnailSize::Standard => "standard",
            ThumbnailSize::High => "high",
            ThumbnailSize::Medium => "medium",
            ThumbnailSize::Default => "default",
        }
    }
}

/// Category id to label mapping for one region
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMap(pub BTreeMap<String, String>);

impl CategoryMap {
    /// Label for a category id, `"Unknown"` when absent
    pub fn label(&self, category_id: &str) -> String {
        self.0
            .get(category_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
    }

    /// Number of known categories
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map holds no categories
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One entry of a batch output file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelVideos {
    /// The channel as known after harvesting (identifier resolved if possible)
    pub channel: ChannelRecord,
    /// Videos retrieved for the channel, empty if the item failed
    pub videos: Vec<VideoRecord>,
    /// Why no videos were retrieved, if the item failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable progress of one partition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    /// Partition the checkpoint belongs to
    #[serde(default)]
    pub partition: String,
    /// Number of leading items fully processed
    pub last_processed_offset: usize,
    /// Item count of the partition when the checkpoint was written
    #[serde(default)]
    pub total_items: usize,
    /// When the checkpoint was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CheckpointState {
    /// Initial state for a partition that has never been processed
    pub fn initial(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            last_processed_offset: 0,
            total_items: 0,
            updated_at: None,
        }
    }

    /// State at `offset` out of `total_items`, stamped now
    pub fn at(partition: &str, offset: usize, total_items: usize) -> Self {
        Self {
            partition: partition.to_string(),
            last_processed_offset: offset.min(total_items),
            total_items,
            updated_at: Some(Utc::now()),
        }
    }

    /// Whether every item of a partition of `total_items` has been processed
    pub fn is_complete(&self, total_items: usize) -> bool {
        self.last_processed_offset >= total_items
    }
}

/// Half-open offset range `[start, end)` over a partition's items
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchRange {
    /// First offset (inclusive)
    pub start: usize,
    /// Last offset (exclusive)
    pub end: usize,
}

impl BatchRange {
    /// Create a range; `end` is clamped to be no smaller than `start`
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of items in the range
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Human-readable, 1-based inclusive label (`[0, 50)` is `"1-50"`)
    pub fn label(&self) -> String {
        format!("{}-{}", self.start + 1, self.end)
    }
}

impl std::fmt::Display for BatchRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lifecycle state of a partition run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Not started
    Idle,
    /// Processing batches
    Running,
    /// Stopped on credential exhaustion, resumable as-is
    Paused,
    /// Every item processed
    Completed,
    /// Stopped on a configuration or input problem
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one partition run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Partition key
    pub partition: String,
    /// Terminal state
    pub state: RunState,
    /// Batch files written in this run (complete and partial)
    pub batches_written: usize,
    /// Items attempted in this run
    pub items_attempted: usize,
    /// Items skipped after exhausting retries or on malformed responses
    pub items_failed: usize,
    /// Items left before the partition is complete
    pub remaining_items: usize,
    /// Checkpoint offset at the end of the run
    pub checkpoint_offset: usize,
    /// Partition size
    pub total_items: usize,
    /// Why the run paused or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Event emitted while harvesting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A partition run started
    RunStarted {
        /// Partition key
        partition: String,
        /// Offset the run resumes from
        offset: usize,
        /// Partition size
        total_items: usize,
    },

    /// A batch was fully written and the checkpoint advanced
    BatchCommitted {
        /// Partition key
        partition: String,
        /// Range covered by the batch
        range: BatchRange,
        /// Number of video records written
        videos: usize,
    },

    /// A batch was interrupted and its partial output persisted
    BatchInterrupted {
        /// Partition key
        partition: String,
        /// Range of the interrupted batch
        range: BatchRange,
        /// Items completed before the interruption
        completed_items: usize,
    },

    /// An item was skipped
    ItemFailed {
        /// Partition key
        partition: String,
        /// Offset of the item
        offset: usize,
        /// Channel name
        channel: String,
        /// Failure description
        error: String,
    },

    /// The gateway switched to the next credential
    CredentialRotated {
        /// Ordinal of the refused credential
        from: usize,
        /// Ordinal of the new active credential
        to: usize,
    },

    /// A partition run ended
    RunFinished {
        /// Final report
        report: RunReport,
    },
}
