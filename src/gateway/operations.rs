//! Derived operations built on [`Gateway::call`].
//!
//! Each operation returns either a complete result or one classified error;
//! partial results (for instance a search whose detail fetch failed) are never
//! returned.

use super::{ApiRequest, Gateway, SearchOrder};
use crate::config::{MAX_PAGE_SIZE, RetrievalStrategy};
use crate::error::GatewayError;
use crate::types::{CategoryMap, ChannelRecord, ThumbnailSize, VideoRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Per-run context shared by every item
#[derive(Clone, Debug, Default)]
pub struct HarvestContext {
    /// Region used for category labels and channel searches
    pub region_code: String,
    /// Category id to label mapping for `region_code`
    pub categories: CategoryMap,
}

impl HarvestContext {
    /// Create a context
    pub fn new(region_code: impl Into<String>, categories: CategoryMap) -> Self {
        Self {
            region_code: region_code.into(),
            categories,
        }
    }
}

/// Channel attributes returned by a lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelDetails {
    /// Channel identifier
    pub id: String,
    /// Channel title
    pub title: String,
    /// Channel description
    pub description: Option<String>,
    /// Best available thumbnail URL
    pub thumbnail: Option<String>,
    /// Country of the channel, or region of the search that found it
    pub region_code: Option<String>,
    /// Subscriber count (lookups by id only)
    pub subscriber_count: Option<u64>,
    /// Number of public videos (lookups by id only)
    pub video_count: Option<u64>,
}

impl ChannelDetails {
    /// Merge the details into a listing record
    ///
    /// Name, rank and the ranking site's category and URL come from the
    /// listing; looked-up values win for everything else.
    pub fn apply_to(&self, channel: &ChannelRecord) -> ChannelRecord {
        ChannelRecord {
            id: Some(self.id.clone()),
            description: self.description.clone().or_else(|| channel.description.clone()),
            thumbnail: self.thumbnail.clone().or_else(|| channel.thumbnail.clone()),
            region_code: self.region_code.clone().or_else(|| channel.region_code.clone()),
            subscribers: self.subscriber_count.or(channel.subscribers),
            video_count: self.video_count.or(channel.video_count),
            ..channel.clone()
        }
    }
}

/// Look up a channel by identifier
pub async fn lookup_channel(
    gateway: &Gateway,
    channel_id: &str,
) -> Result<ChannelDetails, GatewayError> {
    let response = gateway
        .call(&ApiRequest::ChannelsById {
            ids: vec![channel_id.to_string()],
        })
        .await?;

    let item = first_item(&response)
        .ok_or_else(|| GatewayError::Malformed(format!("channel {channel_id} not found")))?;
    let snippet = &item["snippet"];
    let statistics = &item["statistics"];

    Ok(ChannelDetails {
        id: item["id"].as_str().unwrap_or(channel_id).to_string(),
        title: text(snippet, "title"),
        description: snippet["description"].as_str().map(String::from),
        thumbnail: best_thumbnail(snippet),
        region_code: snippet["country"].as_str().map(String::from),
        subscriber_count: optional_count(&statistics["subscriberCount"]),
        video_count: optional_count(&statistics["videoCount"]),
    })
}

/// Resolve a channel by display name, taking the first search hit
pub async fn lookup_channel_by_name(
    gateway: &Gateway,
    name: &str,
) -> Result<ChannelDetails, GatewayError> {
    let response = gateway
        .call(&ApiRequest::SearchChannels {
            query: name.to_string(),
        })
        .await?;

    let item = first_item(&response)
        .ok_or_else(|| GatewayError::Malformed(format!("no channel matches {name:?}")))?;
    let id = item["id"]["channelId"]
        .as_str()
        .or_else(|| item["snippet"]["channelId"].as_str())
        .ok_or_else(|| GatewayError::Malformed(format!("search hit for {name:?} has no channelId")))?;
    let snippet = &item["snippet"];

    Ok(ChannelDetails {
        id: id.to_string(),
        title: text(snippet, "title"),
        description: snippet["description"].as_str().map(String::from),
        thumbnail: best_thumbnail(snippet),
        region_code: response["regionCode"].as_str().map(String::from),
        subscriber_count: None,
        video_count: None,
    })
}

/// Category id to label mapping for a region
pub async fn list_category_labels(
    gateway: &Gateway,
    region_code: &str,
) -> Result<CategoryMap, GatewayError> {
    let response = gateway
        .call(&ApiRequest::VideoCategories {
            region_code: region_code.to_string(),
        })
        .await?;

    let items = response["items"]
        .as_array()
        .ok_or_else(|| GatewayError::Malformed("videoCategories response has no items".into()))?;

    let mut categories = CategoryMap::default();
    for item in items {
        if let (Some(id), Some(title)) = (item["id"].as_str(), item["snippet"]["title"].as_str()) {
            categories.0.insert(id.to_string(), title.to_string());
        }
    }
    Ok(categories)
}

/// Video identifiers of a channel selected by `strategy`
///
/// Follows `nextPageToken` until the strategy's `max_results` identifiers are
/// collected or the listing ends.
pub async fn search_video_ids(
    gateway: &Gateway,
    channel_id: &str,
    strategy: &RetrievalStrategy,
) -> Result<Vec<String>, GatewayError> {
    let wanted = strategy.max_results() as usize;
    let (order, published_after, published_before) = search_bounds(strategy);

    let mut ids: Vec<String> = Vec::with_capacity(wanted);
    let mut page_token: Option<String> = None;

    while ids.len() < wanted {
        let page_size = (wanted - ids.len()).min(MAX_PAGE_SIZE as usize) as u32;
        let response = gateway
            .call(&ApiRequest::SearchVideos {
                channel_id: channel_id.to_string(),
                order,
                max_results: page_size,
                published_after,
                published_before,
                page_token: page_token.take(),
            })
            .await?;

        let items = response["items"].as_array().ok_or_else(|| {
            GatewayError::Malformed(format!("search response for {channel_id} has no items"))
        })?;

        for item in items {
            if let Some(id) = item["id"]["videoId"].as_str() {
                if !ids.iter().any(|known| known == id) {
                    ids.push(id.to_string());
                }
            }
        }

        match response["nextPageToken"].as_str() {
            Some(token) if !items.is_empty() => page_token = Some(token.to_string()),
            _ => break,
        }
    }

    ids.truncate(wanted);
    Ok(ids)
}

fn search_bounds(
    strategy: &RetrievalStrategy,
) -> (SearchOrder, Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match strategy {
        RetrievalStrategy::TopByViews { .. } => (SearchOrder::ViewCount, None, None),
        RetrievalStrategy::ByTimeRange { start, end, .. } => {
            (SearchOrder::Date, Some(*start), Some(*end))
        }
        RetrievalStrategy::ByRecency { .. } => (SearchOrder::Date, None, None),
    }
}

/// Detail and statistics for `ids`, in the order given
///
/// Identifiers the API does not return (deleted or private videos) are left
/// out; an item that cannot be parsed fails the whole fetch.
pub async fn fetch_videos(
    gateway: &Gateway,
    ids: &[String],
    categories: &CategoryMap,
) -> Result<Vec<VideoRecord>, GatewayError> {
    let mut by_id: HashMap<String, VideoRecord> = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(MAX_PAGE_SIZE as usize) {
        let response = gateway
            .call(&ApiRequest::VideosById {
                ids: chunk.to_vec(),
            })
            .await?;

        let items = response["items"]
            .as_array()
            .ok_or_else(|| GatewayError::Malformed("videos response has no items".into()))?;
        for item in items {
            let video = parse_video(item, categories)?;
            by_id.insert(video.video_id.clone(), video);
        }
    }

    let mut videos = Vec::with_capacity(by_id.len());
    for id in ids {
        match by_id.remove(id) {
            Some(video) => videos.push(video),
            None => tracing::debug!(video_id = %id, "Video missing from detail response"),
        }
    }
    Ok(videos)
}

/// Search a channel's videos with `strategy` and fetch their details
pub async fn fetch_channel_videos(
    gateway: &Gateway,
    context: &HarvestContext,
    channel_id: &str,
    strategy: &RetrievalStrategy,
) -> Result<Vec<VideoRecord>, GatewayError> {
    let ids = search_video_ids(gateway, channel_id, strategy).await?;
    if ids.is_empty() {
        tracing::info!(channel_id, strategy = strategy.name(), "No videos found");
        return Ok(Vec::new());
    }
    fetch_videos(gateway, &ids, &context.categories).await
}

/// Build a [`VideoRecord`] from one `videos.list` item
pub fn parse_video(item: &Value, categories: &CategoryMap) -> Result<VideoRecord, GatewayError> {
    let video_id = item["id"]
        .as_str()
        .ok_or_else(|| GatewayError::Malformed("video item has no id".into()))?;
    let snippet = &item["snippet"];
    if !snippet.is_object() {
        return Err(GatewayError::Malformed(format!("video {video_id} has no snippet")));
    }
    let statistics = &item["statistics"];

    let published_at = snippet["publishedAt"]
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| {
            GatewayError::Malformed(format!("video {video_id} has no valid publishedAt"))
        })?;

    Ok(VideoRecord {
        video_id: video_id.to_string(),
        title: text(snippet, "title"),
        description: text(snippet, "description"),
        category: categories.label(snippet["categoryId"].as_str().unwrap_or_default()),
        thumbnail: best_thumbnail(snippet),
        author: text(snippet, "channelTitle"),
        author_id: text(snippet, "channelId"),
        views: optional_count(&statistics["viewCount"]).unwrap_or(0),
        likes: optional_count(&statistics["likeCount"]).unwrap_or(0),
        comments: optional_count(&statistics["commentCount"]).unwrap_or(0),
        published_at,
    })
}

/// URL of the largest thumbnail present in a snippet
pub fn best_thumbnail(snippet: &Value) -> Option<String> {
    ThumbnailSize::PREFERENCE.iter().find_map(|size| {
        snippet["thumbnails"][size.as_key()]["url"]
            .as_str()
            .map(String::from)
    })
}

// Statistics arrive as decimal strings; hidden counters are absent
fn optional_count(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn first_item(response: &Value) -> Option<&Value> {
    response["items"].as_array().and_then(|items| items.first())
}

fn text(object: &Value, key: &str) -> String {
    object[key].as_str().unwrap_or_default().to_string()
}
