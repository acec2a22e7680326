//! Common test utilities for yt-harvest end-to-end tests

use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yt_harvest::{ChannelRecord, Config};

/// Partition used throughout the end-to-end tests
pub const PARTITION: &str = "poland";

/// Workspace with credential descriptors, a channel listing and a config
/// pointing every directory into the temp dir and the API at `server`
pub fn workspace(server: &MockServer, keys: &[&str], channels: &[ChannelRecord]) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();

    let credentials = dir.path().join("credentials");
    std::fs::create_dir_all(&credentials).unwrap();
    for (i, key) in keys.iter().enumerate() {
        std::fs::write(
            credentials.join(format!("{:02}.json", i + 1)),
            json!({ "api_key": key }).to_string(),
        )
        .unwrap();
    }

    let listings = dir.path().join("channels");
    std::fs::create_dir_all(&listings).unwrap();
    std::fs::write(
        listings.join(format!("top_1000_{PARTITION}.json")),
        serde_json::to_string_pretty(channels).unwrap(),
    )
    .unwrap();

    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.request_timeout = Duration::from_secs(5);
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.storage.credentials_dir = credentials;
    config.storage.channels_dir = listings;
    config.storage.output_dir = dir.path().join("videos");
    config.storage.checkpoint_dir = dir.path().join("checkpoints");
    config.storage.sqlite_path = dir.path().join("checkpoints.db");

    (dir, config)
}

/// Channels `UC0..UC{n}` with resolved identifiers
pub fn channels(n: usize) -> Vec<ChannelRecord> {
    (0..n)
        .map(|i| ChannelRecord::with_id(format!("UC{i}"), format!("Channel {i}"), i as u32 + 1))
        .collect()
}

/// Mount category, search and video-detail responses that always succeed
pub async fn mount_youtube(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/videoCategories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "10", "snippet": { "title": "Music" } }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("type", "video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": { "videoId": "vid-a" } },
                { "id": { "videoId": "vid-b" } }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [video("vid-a", "1200"), video("vid-b", "300")]
        })))
        .mount(server)
        .await;
}

/// Make `key` answer every video search with a quota error
pub async fn mount_quota_for(server: &MockServer, key: &str) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("key", key))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{ "domain": "youtube.quota", "reason": "quotaExceeded" }]
            }
        })))
        .with_priority(1)
        .mount(server)
        .await;
}

fn video(id: &str, views: &str) -> Value {
    json!({
        "id": id,
        "snippet": {
            "title": format!("Video {id}"),
            "description": "",
            "categoryId": "10",
            "channelTitle": "Some Channel",
            "channelId": "UC0",
            "publishedAt": "2024-05-01T10:00:00Z",
            "thumbnails": { "medium": { "url": format!("https://i.ytimg.com/{id}/mq.jpg") } }
        },
        "statistics": { "viewCount": views, "likeCount": "5" }
    })
}

/// Names of the files in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Parse a JSON file
pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
