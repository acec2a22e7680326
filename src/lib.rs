//! # yt-harvest
//!
//! Fault-tolerant batch harvesting of YouTube channel and video records.
//!
//! ## Design Philosophy
//!
//! yt-harvest is designed to be:
//! - **Quota-aware** - A pool of credentials is rotated when one runs out of quota
//! - **Resumable** - Per-partition checkpoints make every run restartable
//! - **Failure-tolerant** - A broken item is skipped, never the whole batch
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use yt_harvest::{BatchRunner, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("harvest.json")?;
//!     let runner = BatchRunner::from_config(&config).await?;
//!
//!     // Subscribe to events
//!     let mut events = runner.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = runner.run("poland").await;
//!     println!("{}: {}", report.partition, report.state);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Checkpoint persistence
pub mod checkpoint;
/// Configuration types
pub mod config;
/// Credential pool and rotation
pub mod credentials;
/// Error types
pub mod error;
/// Remote API gateway
pub mod gateway;
/// Batch output files
pub mod output;
/// Partition listings
pub mod partition;
/// Item-level retry
pub mod retry;
/// Partition runs
pub mod runner;
/// Core data types
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, FileCheckpointStore, SqliteCheckpointStore};
pub use config::{Config, RetrievalStrategy};
pub use credentials::{CredentialPool, DescriptorFileAuthenticator};
pub use error::{CredentialError, Error, GatewayError, Result};
pub use gateway::{ApiRequest, Gateway, HarvestContext, RemoteApi, YoutubeApi};
pub use output::{BatchSink, JsonBatchSink};
pub use partition::{ChannelLister, JsonChannelLister};
pub use runner::{BatchRunner, PartitionStatus, Storage};
pub use types::{
    BatchRange, CategoryMap, ChannelRecord, ChannelVideos, CheckpointState, Event, RunReport,
    RunState, VideoRecord,
};

/// Run partitions one after another until done or a termination signal arrives
///
/// Partitions are processed in the given order. A signal stops the current
/// partition where it is; its last checkpoint stays a safe resume point, so no
/// report is produced for it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use yt_harvest::{BatchRunner, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let runner = BatchRunner::from_config(&config).await?;
///
///     let partitions = vec!["poland".to_string(), "united-states".to_string()];
///     for report in run_with_shutdown(&runner, &partitions).await {
///         println!("{}: {}", report.partition, report.state);
///     }
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(runner: &BatchRunner, partitions: &[String]) -> Vec<RunReport> {
    let mut reports = Vec::with_capacity(partitions.len());

    let run_all = async {
        for partition in partitions {
            let report = runner.run(partition).await;
            reports.push(report);
        }
    };

    tokio::select! {
        _ = run_all => {}
        _ = wait_for_signal() => {
            tracing::warn!("Stopping on signal; progress up to the last checkpoint is kept");
        }
    }

    reports
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
