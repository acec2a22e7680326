//! Configuration types for yt-harvest

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page the search endpoint serves in one response
pub const MAX_PAGE_SIZE: u32 = 50;

/// Upper bound on videos requested per channel, to keep quota use predictable
pub const MAX_RESULTS_PER_CHANNEL: u32 = 500;

/// Largest accepted `retry.backoff_multiplier`
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Main configuration for a harvesting run
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Batch size, retrieval strategy, region and pacing
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Item-level retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Remote API endpoint settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Where credentials, inputs, outputs and checkpoints live
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load and validate a configuration file (JSON)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {e}", path.display()),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.harvest.batch_size == 0 {
            return Err(Error::config(
                "batch size must be at least 1",
                "harvest.batch_size",
            ));
        }
        if self.harvest.region_code.len() != 2 {
            return Err(Error::config(
                format!(
                    "region code must be a two-letter code, got {:?}",
                    self.harvest.region_code
                ),
                "harvest.region_code",
            ));
        }
        self.harvest.strategy.validate()?;

        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "at least one attempt is required",
                "retry.max_attempts",
            ));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.retry.backoff_multiplier) {
            return Err(Error::config(
                format!(
                    "backoff multiplier must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}, got {}",
                    self.retry.backoff_multiplier
                ),
                "retry.backoff_multiplier",
            ));
        }

        url::Url::parse(&self.api.base_url).map_err(|e| {
            Error::config(format!("invalid base URL: {e}"), "api.base_url")
        })?;

        Ok(())
    }
}

/// How videos are retrieved for each channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Most viewed videos of the channel
    TopByViews {
        /// Videos per channel (default: 10)
        #[serde(default = "default_max_results")]
        max_results: u32,
    },
    /// Videos published inside `[start, end)`
    ByTimeRange {
        /// Published after (inclusive)
        start: DateTime<Utc>,
        /// Published before (exclusive)
        end: DateTime<Utc>,
        /// Videos per channel (default: 10)
        #[serde(default = "default_max_results")]
        max_results: u32,
    },
    /// Most recent uploads of the channel
    ByRecency {
        /// Videos per channel (default: 10)
        #[serde(default = "default_max_results")]
        max_results: u32,
    },
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        RetrievalStrategy::TopByViews {
            max_results: default_max_results(),
        }
    }
}

impl RetrievalStrategy {
    /// Requested number of videos per channel
    pub fn max_results(&self) -> u32 {
        match self {
            RetrievalStrategy::TopByViews { max_results }
            | RetrievalStrategy::ByTimeRange { max_results, .. }
            | RetrievalStrategy::ByRecency { max_results } => *max_results,
        }
    }

    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            RetrievalStrategy::TopByViews { .. } => "top_by_views",
            RetrievalStrategy::ByTimeRange { .. } => "by_time_range",
            RetrievalStrategy::ByRecency { .. } => "by_recency",
        }
    }

    fn validate(&self) -> Result<()> {
        let max_results = self.max_results();
        if max_results == 0 || max_results > MAX_RESULTS_PER_CHANNEL {
            return Err(Error::config(
                format!("max_results must be between 1 and {MAX_RESULTS_PER_CHANNEL}, got {max_results}"),
                "harvest.strategy.max_results",
            ));
        }
        if let RetrievalStrategy::ByTimeRange { start, end, .. } = self {
            if start >= end {
                return Err(Error::config(
                    format!("time range start {start} is not before end {end}"),
                    "harvest.strategy.start",
                ));
            }
        }
        Ok(())
    }
}

/// Harvesting behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Items per committed batch (default: 50)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Video retrieval strategy (default: top 10 by views)
    #[serde(default)]
    pub strategy: RetrievalStrategy,

    /// Region used for category labels (default: "US")
    #[serde(default = "default_region_code")]
    pub region_code: String,

    /// Re-fetch channel details for channels that already have an identifier
    #[serde(default)]
    pub refresh_channel_details: bool,

    /// Pause between items, in seconds (default: 0)
    #[serde(default, with = "duration_serde")]
    pub item_delay: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            strategy: RetrievalStrategy::default(),
            region_code: default_region_code(),
            refresh_channel_details: false,
            item_delay: Duration::ZERO,
        }
    }
}

/// Retry configuration for transient failures
///
/// `max_attempts` counts every attempt, the first one included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per item (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 3 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0, fixed backoff)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Remote API endpoint settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the YouTube Data API (default: v3 on googleapis.com)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Checkpoint persistence backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    /// One JSON file per partition (default)
    #[default]
    File,
    /// Rows in a SQLite database
    Sqlite,
}

/// Filesystem layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of credential descriptors (default: "./config/credentials")
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// Directory of partition channel listings (default: "./data/channels")
    #[serde(default = "default_channels_dir")]
    pub channels_dir: PathBuf,

    /// Directory for batch output files (default: "./data/videos")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for checkpoint files (default: "./data/checkpoints")
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Checkpoint backend (default: file)
    #[serde(default)]
    pub checkpoint_backend: CheckpointBackend,

    /// SQLite database used by the sqlite backend (default: "./data/checkpoints.db")
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_dir: default_credentials_dir(),
            channels_dir: default_channels_dir(),
            output_dir: default_output_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_backend: CheckpointBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_max_results() -> u32 {
    10
}

fn default_region_code() -> String {
    "US".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from("./config/credentials")
}

fn default_channels_dir() -> PathBuf {
    PathBuf::from("./data/channels")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/videos")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./data/checkpoints.db")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
