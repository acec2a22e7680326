//! Batch runner: drives one partition from its checkpoint to completion.
//!
//! Items are processed one at a time in fixed-size batches. The checkpoint
//! only ever points at the end of a batch whose output is durably written:
//!
//! - a completed batch is written, then the checkpoint advances to its end
//! - on credential exhaustion the partial batch is written under its own
//!   name, the checkpoint is set to the batch start and the run pauses
//! - a transient failure that survives the retry budget, or a malformed
//!   response, skips the item and the batch carries on
//! - fatal errors, missing credentials and unusable input fail the run

mod batch;

pub use batch::BatchPlan;

use crate::checkpoint::{CheckpointStore, open_store};
use crate::config::{Config, HarvestConfig, RetryConfig};
use crate::credentials::{CredentialPool, DescriptorFileAuthenticator};
use crate::error::{GatewayError, Result};
use crate::gateway::operations::{
    fetch_channel_videos, list_category_labels, lookup_channel, lookup_channel_by_name,
};
use crate::gateway::{Gateway, HarvestContext, YoutubeApi};
use crate::output::{BatchSink, JsonBatchSink};
use crate::partition::{ChannelLister, JsonChannelLister};
use crate::retry::with_retry;
use crate::types::{
    BatchRange, CategoryMap, ChannelRecord, ChannelVideos, CheckpointState, Event, RunReport,
    RunState,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Where a runner reads its input and writes its progress and output
#[derive(Clone)]
pub struct Storage {
    /// Partition listings
    pub lister: Arc<dyn ChannelLister>,
    /// Checkpoint persistence
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Batch output
    pub sink: Arc<dyn BatchSink>,
}

/// Checkpoint position of a partition relative to its listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionStatus {
    /// Stored checkpoint (offset clamped to the listing size)
    pub checkpoint: CheckpointState,
    /// Listing size
    pub total_items: usize,
    /// Items left to process
    pub remaining_items: usize,
    /// Batches left to process
    pub remaining_batches: usize,
}

enum BatchOutcome {
    Committed,
    Interrupted,
    Aborted(String),
}

/// Sequential, checkpointed harvester for partitions
pub struct BatchRunner {
    gateway: Gateway,
    storage: Storage,
    harvest: HarvestConfig,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
}

impl BatchRunner {
    /// Assemble a runner; the gateway's rotations are reported on the runner's events
    pub fn new(
        gateway: Gateway,
        storage: Storage,
        harvest: HarvestConfig,
        retry: RetryConfig,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            gateway: gateway.with_events(event_tx.clone()),
            storage,
            harvest,
            retry,
            event_tx,
        }
    }

    /// Build the production runner: YouTube transport, descriptor directory,
    /// JSON listings and output, configured checkpoint backend
    pub async fn from_config(config: &Config) -> Result<Self> {
        let api = Arc::new(YoutubeApi::new(&config.api)?);
        let pool = CredentialPool::from_dir(
            &config.storage.credentials_dir,
            Arc::new(DescriptorFileAuthenticator),
        )
        .await?;

        let storage = Storage {
            lister: Arc::new(JsonChannelLister::new(&config.storage.channels_dir)),
            checkpoints: open_store(&config.storage).await?,
            sink: Arc::new(JsonBatchSink::new(&config.storage.output_dir)),
        };

        Ok(Self::new(
            Gateway::new(api, pool),
            storage,
            config.harvest.clone(),
            config.retry.clone(),
        ))
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The gateway shared by every partition run
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Where the partition stands, without touching the remote API
    pub async fn status(&self, partition: &str) -> Result<PartitionStatus> {
        let channels = self.storage.lister.list_channels(partition).await?;
        let total_items = channels.len();
        let mut checkpoint = self.storage.checkpoints.load(partition).await;
        checkpoint.last_processed_offset = checkpoint.last_processed_offset.min(total_items);

        let plan = BatchPlan::new(
            checkpoint.last_processed_offset,
            total_items,
            self.harvest.batch_size,
        );
        Ok(PartitionStatus {
            remaining_items: total_items - checkpoint.last_processed_offset,
            remaining_batches: plan.remaining_batches(),
            checkpoint,
            total_items,
        })
    }

    /// Forget a partition's progress so the next run starts at offset 0
    pub async fn reset(&self, partition: &str) -> Result<()> {
        self.storage.checkpoints.clear(partition).await?;
        tracing::info!(partition, "Checkpoint cleared");
        Ok(())
    }

    /// Harvest `partition` from its checkpoint
    ///
    /// Never returns an error: every outcome is a [`RunReport`] in state
    /// `Completed`, `Paused` or `Failed`.
    pub async fn run(&self, partition: &str) -> RunReport {
        let mut report = RunReport {
            partition: partition.to_string(),
            state: RunState::Idle,
            batches_written: 0,
            items_attempted: 0,
            items_failed: 0,
            remaining_items: 0,
            checkpoint_offset: 0,
            total_items: 0,
            reason: None,
        };

        let channels = match self.storage.lister.list_channels(partition).await {
            Ok(channels) => channels,
            Err(e) => return self.finish(report, RunState::Failed, Some(e.to_string())),
        };
        let total = channels.len();

        let checkpoint = self.storage.checkpoints.load(partition).await;
        if checkpoint.last_processed_offset > total {
            tracing::warn!(
                partition,
                offset = checkpoint.last_processed_offset,
                total,
                "Checkpoint beyond partition size, clamping"
            );
        }
        let offset = checkpoint.last_processed_offset.min(total);

        report.state = RunState::Running;
        report.total_items = total;
        report.checkpoint_offset = offset;

        tracing::info!(
            partition,
            offset,
            total,
            batch_size = self.harvest.batch_size,
            strategy = self.harvest.strategy.name(),
            "Starting partition run"
        );
        self.emit(Event::RunStarted {
            partition: partition.to_string(),
            offset,
            total_items: total,
        });

        if offset >= total {
            tracing::info!(partition, "Partition already complete, nothing to do");
            return self.finish(report, RunState::Completed, None);
        }

        if let Err(e) = self.gateway.ensure_credentials().await {
            return self.stop_on(report, &e);
        }

        let context = match self.prepare_context().await {
            Ok(context) => context,
            Err(e) => return self.stop_on(report, &e),
        };

        for range in BatchPlan::new(offset, total, self.harvest.batch_size) {
            let items = &channels[range.start..range.end];
            match self.run_batch(partition, range, items, &context, &mut report).await {
                BatchOutcome::Committed => {}
                BatchOutcome::Interrupted => {
                    let reason = format!(
                        "all credentials exhausted; resume at offset {} ({} items remaining)",
                        report.checkpoint_offset,
                        total - report.checkpoint_offset
                    );
                    return self.finish(report, RunState::Paused, Some(reason));
                }
                BatchOutcome::Aborted(reason) => {
                    return self.finish(report, RunState::Failed, Some(reason));
                }
            }
        }

        self.finish(report, RunState::Completed, None)
    }

    /// Fetch the region's category labels once per run
    async fn prepare_context(&self) -> std::result::Result<HarvestContext, GatewayError> {
        let region = self.harvest.region_code.as_str();
        let gateway = &self.gateway;

        match with_retry(&self.retry, move || list_category_labels(gateway, region)).await {
            Ok(categories) => {
                tracing::debug!(region, categories = categories.len(), "Category labels loaded");
                Ok(HarvestContext::new(region, categories))
            }
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                tracing::warn!(region, error = %e, "Category labels unavailable, using \"Unknown\"");
                Ok(HarvestContext::new(region, CategoryMap::default()))
            }
        }
    }

    async fn run_batch(
        &self,
        partition: &str,
        range: BatchRange,
        items: &[ChannelRecord],
        context: &HarvestContext,
        report: &mut RunReport,
    ) -> BatchOutcome {
        tracing::info!(partition, range = %range, "Processing batch");
        let mut entries: Vec<ChannelVideos> = Vec::with_capacity(items.len());

        for (index, channel) in items.iter().enumerate() {
            let offset = range.start + index;
            if report.items_attempted > 0 && !self.harvest.item_delay.is_zero() {
                tokio::time::sleep(self.harvest.item_delay).await;
            }
            report.items_attempted += 1;

            match self.harvest_item(channel, context).await {
                Ok(entry) => entries.push(entry),
                Err((channel, GatewayError::CredentialsExhausted)) => {
                    tracing::warn!(
                        partition,
                        offset,
                        channel = %channel.name,
                        "Credentials exhausted mid-batch"
                    );
                    self.interrupt_batch(partition, range, &entries, report).await;
                    return BatchOutcome::Interrupted;
                }
                Err((channel, e)) if e.is_terminal() => {
                    tracing::error!(partition, offset, channel = %channel.name, error = %e, "Aborting run");
                    return BatchOutcome::Aborted(e.to_string());
                }
                Err((channel, e)) => {
                    report.items_failed += 1;
                    tracing::warn!(
                        partition,
                        offset,
                        channel = %channel.name,
                        error = %e,
                        "Skipping item"
                    );
                    self.emit(Event::ItemFailed {
                        partition: partition.to_string(),
                        offset,
                        channel: channel.name.clone(),
                        error: e.to_string(),
                    });
                    entries.push(ChannelVideos {
                        channel,
                        videos: Vec::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if let Err(e) = self.storage.sink.write_batch(partition, range, &entries).await {
            tracing::error!(partition, range = %range, error = %e, "Batch output failed");
            return BatchOutcome::Aborted(e.to_string());
        }
        report.batches_written += 1;

        self.save_checkpoint(partition, range.end, report).await;
        self.emit(Event::BatchCommitted {
            partition: partition.to_string(),
            range,
            videos: entries.iter().map(|entry| entry.videos.len()).sum(),
        });
        BatchOutcome::Committed
    }

    async fn interrupt_batch(
        &self,
        partition: &str,
        range: BatchRange,
        entries: &[ChannelVideos],
        report: &mut RunReport,
    ) {
        match self.storage.sink.write_partial(partition, range, entries).await {
            Ok(_) => report.batches_written += 1,
            Err(e) => {
                tracing::warn!(partition, range = %range, error = %e, "Partial batch not saved");
            }
        }

        self.save_checkpoint(partition, range.start, report).await;
        self.emit(Event::BatchInterrupted {
            partition: partition.to_string(),
            range,
            completed_items: entries.len(),
        });
    }

    /// Resolve the channel if needed and fetch its videos
    ///
    /// On failure the channel is handed back (with whatever was resolved)
    /// together with the error that ended the item.
    async fn harvest_item(
        &self,
        channel: &ChannelRecord,
        context: &HarvestContext,
    ) -> std::result::Result<ChannelVideos, (ChannelRecord, GatewayError)> {
        let gateway = &self.gateway;
        let mut channel = channel.clone();

        let details = match channel.channel_id() {
            None => {
                let name = channel.name.as_str();
                Some(with_retry(&self.retry, move || lookup_channel_by_name(gateway, name)).await)
            }
            Some(id) if self.harvest.refresh_channel_details => {
                Some(with_retry(&self.retry, move || lookup_channel(gateway, id)).await)
            }
            Some(_) => None,
        };
        match details {
            Some(Ok(details)) => channel = details.apply_to(&channel),
            Some(Err(e)) => return Err((channel, e)),
            None => {}
        }

        let Some(channel_id) = channel.channel_id().map(str::to_string) else {
            return Err((
                channel,
                GatewayError::Malformed("channel has no identifier".into()),
            ));
        };

        let strategy = &self.harvest.strategy;
        let id = channel_id.as_str();
        match with_retry(&self.retry, move || {
            fetch_channel_videos(gateway, context, id, strategy)
        })
        .await
        {
            Ok(videos) => {
                tracing::debug!(channel = %channel.name, videos = videos.len(), "Item harvested");
                Ok(ChannelVideos {
                    channel,
                    videos,
                    error: None,
                })
            }
            Err(e) => Err((channel, e)),
        }
    }

    async fn save_checkpoint(&self, partition: &str, offset: usize, report: &mut RunReport) {
        let state = CheckpointState::at(partition, offset, report.total_items);
        report.checkpoint_offset = state.last_processed_offset;

        if let Err(e) = self.storage.checkpoints.save(&state).await {
            tracing::warn!(partition, offset, error = %e, "Checkpoint not persisted");
        }
    }

    /// End the run on a gateway error raised outside an item
    fn stop_on(&self, report: RunReport, error: &GatewayError) -> RunReport {
        let state = match error {
            GatewayError::CredentialsExhausted => RunState::Paused,
            _ => RunState::Failed,
        };
        self.finish(report, state, Some(error.to_string()))
    }

    fn finish(&self, mut report: RunReport, state: RunState, reason: Option<String>) -> RunReport {
        report.state = state;
        report.reason = reason;
        report.remaining_items = report.total_items - report.checkpoint_offset;

        match state {
            RunState::Failed => tracing::error!(
                partition = %report.partition,
                reason = report.reason.as_deref().unwrap_or_default(),
                "Partition run failed"
            ),
            _ => tracing::info!(
                partition = %report.partition,
                state = %state,
                batches = report.batches_written,
                attempted = report.items_attempted,
                failed = report.items_failed,
                remaining = report.remaining_items,
                "Partition run finished"
            ),
        }

        self.emit(Event::RunFinished {
            report: report.clone(),
        });
        report
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
