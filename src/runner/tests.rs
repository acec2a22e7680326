use super::*;
use crate::checkpoint::FileCheckpointStore;
use crate::gateway::ApiRequest;
use crate::test_helpers::{ScriptedApi, quota_error, test_gateway, youtube_fixture};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const PARTITION: &str = "poland";

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}

fn channels_with_ids(total: usize) -> Vec<ChannelRecord> {
    (0..total)
        .map(|i| ChannelRecord::with_id(format!("UC{i}"), format!("Channel {i}"), i as u32 + 1))
        .collect()
}

fn write_listing(dir: &Path, channels: &[ChannelRecord]) {
    let listings = dir.join("channels");
    std::fs::create_dir_all(&listings).unwrap();
    std::fs::write(
        listings.join(format!("top_1000_{PARTITION}.json")),
        serde_json::to_string(channels).unwrap(),
    )
    .unwrap();
}

fn output_dir(dir: &Path) -> PathBuf {
    dir.join("videos")
}

fn checkpoints(dir: &Path) -> FileCheckpointStore {
    FileCheckpointStore::new(dir.join("checkpoints"))
}

/// Runner over `dir` with file-backed listing, checkpoints and output
async fn runner(
    dir: &Path,
    api: Arc<ScriptedApi>,
    credentials: usize,
    batch_size: usize,
) -> BatchRunner {
    let storage = Storage {
        lister: Arc::new(JsonChannelLister::new(dir.join("channels"))),
        checkpoints: Arc::new(checkpoints(dir)),
        sink: Arc::new(JsonBatchSink::new(output_dir(dir))),
    };
    let harvest = HarvestConfig {
        batch_size,
        ..HarvestConfig::default()
    };
    BatchRunner::new(test_gateway(api, credentials).await, storage, harvest, fast_retry())
}

fn written_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(output_dir(dir)) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

fn read_batch(dir: &Path, name: &str) -> Vec<ChannelVideos> {
    let raw = std::fs::read_to_string(output_dir(dir).join(name)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn partition_of_237_is_written_as_five_batches_in_order() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(237));
    let runner = runner(dir.path(), ScriptedApi::youtube(), 1, 50).await;
    let mut events = runner.subscribe();

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.batches_written, 5);
    assert_eq!(report.items_attempted, 237);
    assert_eq!(report.items_failed, 0);
    assert_eq!(report.checkpoint_offset, 237);
    assert_eq!(report.remaining_items, 0);

    let committed: Vec<(usize, usize)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            Event::BatchCommitted { range, .. } => Some((range.start, range.end)),
            _ => None,
        })
        .collect();
    assert_eq!(
        committed,
        vec![(0, 50), (50, 100), (100, 150), (150, 200), (200, 237)]
    );

    assert_eq!(
        written_files(dir.path()),
        vec![
            "videos_poland_1-50.json",
            "videos_poland_101-150.json",
            "videos_poland_151-200.json",
            "videos_poland_201-237.json",
            "videos_poland_51-100.json",
        ]
    );
    let last = read_batch(dir.path(), "videos_poland_201-237.json");
    assert_eq!(last.len(), 37);
    assert_eq!(last[0].channel.name, "Channel 200");
    assert_eq!(last[0].videos.len(), 2);
    assert_eq!(last[0].videos[0].category, "Music");

    let saved = checkpoints(dir.path()).load(PARTITION).await;
    assert_eq!(saved.last_processed_offset, 237);
}

#[tokio::test]
async fn resume_skips_items_before_the_checkpoint() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(237));
    checkpoints(dir.path())
        .save(&CheckpointState::at(PARTITION, 150, 237))
        .await
        .unwrap();
    let api = ScriptedApi::youtube();
    let runner = runner(dir.path(), api.clone(), 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items_attempted, 87);
    let searched = api.searched_channels();
    assert_eq!(searched.first().map(String::as_str), Some("UC150"));
    assert_eq!(searched.len(), 87);
    assert!(
        searched
            .iter()
            .all(|id| id[2..].parse::<usize>().unwrap() >= 150),
        "items [0, 150) must not be fetched again"
    );
    assert_eq!(
        written_files(dir.path()),
        vec!["videos_poland_151-200.json", "videos_poland_201-237.json"]
    );
}

#[tokio::test]
async fn completed_partition_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(237));
    checkpoints(dir.path())
        .save(&CheckpointState::at(PARTITION, 237, 237))
        .await
        .unwrap();
    let api = ScriptedApi::youtube();
    let runner = runner(dir.path(), api.clone(), 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(api.call_count(), 0, "no remote calls");
    assert_eq!(runner.gateway().calls_issued(), 0);
    assert!(written_files(dir.path()).is_empty(), "no batch writes");
    assert_eq!(report.batches_written, 0);
}

#[tokio::test]
async fn quota_on_second_call_rotates_without_the_run_noticing() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(5));
    let api = ScriptedApi::new(|credential, request, index| {
        if index == 1 {
            Err(quota_error(credential))
        } else {
            youtube_fixture(request)
        }
    });
    let runner = runner(dir.path(), api.clone(), 3, 50).await;
    let mut events = runner.subscribe();

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items_failed, 0);
    assert_eq!(runner.gateway().active_credential().await, Some(1));

    let calls = api.calls();
    assert_eq!(calls[1].credential, 0);
    assert_eq!(calls[2].credential, 1);
    assert_eq!(calls[1].request, calls[2].request);
    assert!(
        drain(&mut events).contains(&Event::CredentialRotated { from: 0, to: 1 })
    );
}

#[tokio::test]
async fn exhaustion_mid_batch_pauses_at_batch_start_and_resumes_there() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(237));

    // Item 73 hits a quota that the single credential cannot rotate out of
    let api = ScriptedApi::new(|credential, request, _| match request {
        ApiRequest::SearchVideos { channel_id, .. } if channel_id == "UC73" => {
            Err(quota_error(credential))
        }
        other => youtube_fixture(other),
    });
    let first = runner(dir.path(), api, 1, 50).await;
    let mut events = first.subscribe();

    let report = first.run(PARTITION).await;

    assert_eq!(report.state, RunState::Paused);
    assert_eq!(report.checkpoint_offset, 50, "batch start, not item 73");
    assert_eq!(report.remaining_items, 187);
    assert_eq!(report.batches_written, 2, "one committed batch plus the partial one");
    assert!(report.reason.as_deref().unwrap().contains("exhausted"));
    assert_eq!(
        checkpoints(dir.path()).load(PARTITION).await.last_processed_offset,
        50
    );

    let partial = read_batch(dir.path(), "videos_poland_51-100.partial.json");
    assert_eq!(partial.len(), 23, "items 50..73 were accumulated");
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        Event::BatchInterrupted { range, completed_items: 23, .. } if range.start == 50
    )));

    // Quota has reset: a fresh run picks up the interrupted batch from its start
    let api = ScriptedApi::youtube();
    let second = runner(dir.path(), api.clone(), 1, 50).await;

    let report = second.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        api.searched_channels().first().map(String::as_str),
        Some("UC50")
    );
    let files = written_files(dir.path());
    assert!(files.contains(&"videos_poland_51-100.json".to_string()));
    assert!(
        !files.iter().any(|name| name.contains("partial")),
        "partial output is superseded once the batch completes"
    );
    assert_eq!(read_batch(dir.path(), "videos_poland_51-100.json").len(), 50);
}

#[tokio::test]
async fn item_failing_every_retry_is_skipped_and_checkpoint_advances() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(10));
    let api = ScriptedApi::new(|_, request, _| match request {
        ApiRequest::SearchVideos { channel_id, .. } if channel_id == "UC7" => {
            Err(GatewayError::Transient("HTTP 503".into()))
        }
        other => youtube_fixture(other),
    });
    let runner = runner(dir.path(), api.clone(), 1, 50).await;
    let mut events = runner.subscribe();

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items_failed, 1);
    assert_eq!(report.checkpoint_offset, 10);
    assert_eq!(
        api.searched_channels().iter().filter(|id| *id == "UC7").count(),
        3,
        "three attempts in total"
    );

    let batch = read_batch(dir.path(), "videos_poland_1-10.json");
    assert_eq!(batch.len(), 10, "the failed item keeps its entry");
    assert!(batch[7].videos.is_empty());
    assert!(batch[7].error.as_deref().unwrap().contains("503"));
    assert_eq!(batch[8].videos.len(), 2);

    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        Event::ItemFailed { offset: 7, .. }
    )));
}

#[tokio::test]
async fn malformed_item_is_skipped_without_retry() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(3));
    let api = ScriptedApi::new(|_, request, _| match request {
        ApiRequest::SearchVideos { channel_id, .. } if channel_id == "UC1" => {
            Err(GatewayError::Malformed("HTTP 404".into()))
        }
        other => youtube_fixture(other),
    });
    let runner = runner(dir.path(), api.clone(), 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items_failed, 1);
    assert_eq!(
        api.searched_channels().iter().filter(|id| *id == "UC1").count(),
        1
    );
}

#[tokio::test]
async fn fatal_error_fails_the_run_without_moving_the_checkpoint() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(120));
    let api = ScriptedApi::new(|_, request, _| match request {
        ApiRequest::SearchVideos { channel_id, .. } if channel_id == "UC60" => {
            Err(GatewayError::Fatal("HTTP 401".into()))
        }
        other => youtube_fixture(other),
    });
    let runner = runner(dir.path(), api, 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.checkpoint_offset, 50);
    assert_eq!(
        checkpoints(dir.path()).load(PARTITION).await.last_processed_offset,
        50
    );
    assert_eq!(written_files(dir.path()), vec!["videos_poland_1-50.json"]);
}

#[tokio::test]
async fn no_credentials_fails_before_any_call() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(5));
    let api = ScriptedApi::youtube();
    let runner = runner(dir.path(), api.clone(), 0, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.reason.as_deref().unwrap().contains("no credentials"));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn unusable_partition_input_fails_the_run() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &[]);
    let api = ScriptedApi::youtube();
    let runner = runner(dir.path(), api.clone(), 1, 50).await;

    let report = runner.run(PARTITION).await;
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(api.call_count(), 0);

    let missing = runner.run("atlantis").await;
    assert_eq!(missing.state, RunState::Failed);
}

#[tokio::test]
async fn channels_without_id_are_resolved_by_name() {
    let dir = TempDir::new().unwrap();
    write_listing(
        dir.path(),
        &[ChannelRecord::named("Chopin", 1), ChannelRecord::with_id("UC9", "Known", 2)],
    );
    let api = ScriptedApi::youtube();
    let runner = runner(dir.path(), api.clone(), 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    let batch = read_batch(dir.path(), "videos_poland_1-2.json");
    assert_eq!(batch[0].channel.id.as_deref(), Some("UC-Chopin"));
    assert_eq!(batch[0].channel.region_code.as_deref(), Some("US"));
    assert_eq!(batch[0].videos[0].author_id, "UC-Chopin");
    assert_eq!(api.searched_channels(), vec!["UC-Chopin", "UC9"]);
}

#[tokio::test]
async fn refresh_mode_updates_known_channels() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &[ChannelRecord::with_id("UC9", "Known", 1)]);
    let storage = Storage {
        lister: Arc::new(JsonChannelLister::new(dir.path().join("channels"))),
        checkpoints: Arc::new(checkpoints(dir.path())),
        sink: Arc::new(JsonBatchSink::new(output_dir(dir.path()))),
    };
    let harvest = HarvestConfig {
        refresh_channel_details: true,
        ..HarvestConfig::default()
    };
    let api = ScriptedApi::youtube();
    let runner = BatchRunner::new(test_gateway(api.clone(), 1).await, storage, harvest, fast_retry());

    runner.run(PARTITION).await;

    let batch = read_batch(dir.path(), "videos_poland_1-1.json");
    assert_eq!(batch[0].channel.description.as_deref(), Some("refreshed"));
    assert_eq!(batch[0].channel.region_code.as_deref(), Some("PL"));
    assert_eq!(batch[0].channel.subscribers, Some(1000));
    assert_eq!(batch[0].channel.video_count, Some(12));
    assert!(
        api.calls()
            .iter()
            .any(|call| matches!(&call.request, ApiRequest::ChannelsById { .. }))
    );
}

#[tokio::test]
async fn category_failure_falls_back_to_unknown_labels() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(2));
    let api = ScriptedApi::new(|_, request, _| match request {
        ApiRequest::VideoCategories { .. } => Err(GatewayError::Transient("HTTP 500".into())),
        other => youtube_fixture(other),
    });
    let runner = runner(dir.path(), api, 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Completed);
    let batch = read_batch(dir.path(), "videos_poland_1-2.json");
    assert_eq!(batch[0].videos[0].category, "Unknown");
}

#[tokio::test]
async fn output_failure_fails_the_run_and_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(3));
    // A regular file where the output directory should be
    std::fs::write(output_dir(dir.path()), "not a directory").unwrap();
    let runner = runner(dir.path(), ScriptedApi::youtube(), 1, 50).await;

    let report = runner.run(PARTITION).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.checkpoint_offset, 0);
    assert_eq!(
        checkpoints(dir.path()).load(PARTITION).await.last_processed_offset,
        0
    );
}

#[tokio::test]
async fn oversized_checkpoint_is_clamped_to_partition_size() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(4));
    checkpoints(dir.path())
        .save(&CheckpointState {
            partition: PARTITION.into(),
            last_processed_offset: 40,
            total_items: 40,
            updated_at: None,
        })
        .await
        .unwrap();
    let api = ScriptedApi::youtube();
    let runner = runner(dir.path(), api.clone(), 1, 50).await;

    let status = runner.status(PARTITION).await.unwrap();
    assert_eq!(status.checkpoint.last_processed_offset, 4);
    assert_eq!(status.remaining_items, 0);

    let report = runner.run(PARTITION).await;
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.checkpoint_offset, 4);
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn status_and_reset_report_progress() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(237));
    let store = checkpoints(dir.path());
    store
        .save(&CheckpointState::at(PARTITION, 150, 237))
        .await
        .unwrap();
    let runner = runner(dir.path(), ScriptedApi::youtube(), 1, 50).await;

    let status = runner.status(PARTITION).await.unwrap();
    assert_eq!(status.total_items, 237);
    assert_eq!(status.remaining_items, 87);
    assert_eq!(status.remaining_batches, 2);

    runner.reset(PARTITION).await.unwrap();
    assert_eq!(runner.status(PARTITION).await.unwrap().remaining_items, 237);
}

#[tokio::test]
async fn pool_exhausted_by_an_earlier_partition_pauses_the_next_one() {
    let dir = TempDir::new().unwrap();
    write_listing(dir.path(), &channels_with_ids(3));
    let api = ScriptedApi::new(|credential, request, _| match request {
        ApiRequest::SearchVideos { .. } => Err(quota_error(credential)),
        other => youtube_fixture(other),
    });
    let runner = runner(dir.path(), api.clone(), 2, 50).await;

    assert_eq!(runner.run(PARTITION).await.state, RunState::Paused);
    let calls_after_first = api.call_count();

    let again = runner.run(PARTITION).await;
    assert_eq!(again.state, RunState::Paused);
    assert_eq!(api.call_count(), calls_after_first, "no calls on an exhausted pool");
}
