//! Shared test helpers: in-memory credentials and a scripted remote API.

use crate::credentials::{
    Authenticator, CredentialDescriptor, CredentialHandle, CredentialPool, Secret,
};
use crate::error::{CredentialError, GatewayError};
use crate::gateway::{ApiRequest, Gateway, RemoteApi};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Authenticates every descriptor as `ApiKey("key-<ordinal>")`
pub(crate) struct StaticAuthenticator;

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(
        &self,
        descriptor: &CredentialDescriptor,
    ) -> Result<CredentialHandle, CredentialError> {
        Ok(CredentialHandle::new(
            descriptor.ordinal,
            descriptor.label(),
            Secret::ApiKey(format!("key-{}", descriptor.ordinal)),
        ))
    }
}

/// Pool of `count` in-memory credentials, the first one active
pub(crate) async fn test_pool(count: usize) -> CredentialPool {
    let descriptors = (0..count)
        .map(|ordinal| CredentialDescriptor {
            ordinal,
            path: PathBuf::from(format!("credential-{ordinal}.json")),
        })
        .collect();
    CredentialPool::new(descriptors, Arc::new(StaticAuthenticator)).await
}

/// One request as seen by the transport
#[derive(Clone, Debug)]
pub(crate) struct RecordedCall {
    pub credential: usize,
    pub request: ApiRequest,
}

type Responder =
    Box<dyn Fn(&CredentialHandle, &ApiRequest, usize) -> Result<Value, GatewayError> + Send + Sync>;

/// Remote API double answering through a closure
///
/// The closure receives the credential, the request and the zero-based
/// index of the call across the whole test.
pub(crate) struct ScriptedApi {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedApi {
    pub(crate) fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&CredentialHandle, &ApiRequest, usize) -> Result<Value, GatewayError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every request answered with the canned YouTube fixtures
    pub(crate) fn youtube() -> Arc<Self> {
        Self::new(|_, request, _| youtube_fixture(request))
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Channel ids of every `SearchVideos` request, in order
    pub(crate) fn searched_channels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call.request {
                ApiRequest::SearchVideos { channel_id, .. } => Some(channel_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteApi for ScriptedApi {
    async fn execute(
        &self,
        credential: &CredentialHandle,
        request: &ApiRequest,
    ) -> Result<Value, GatewayError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                credential: credential.ordinal(),
                request: request.clone(),
            });
            calls.len() - 1
        };
        (self.responder)(credential, request, index)
    }
}

/// Gateway over `api` with `credentials` in-memory credentials
pub(crate) async fn test_gateway(api: Arc<ScriptedApi>, credentials: usize) -> Gateway {
    Gateway::new(api, test_pool(credentials).await)
}

/// Canned answers shaped like the YouTube Data API
///
/// Channel `X` has the two videos `X-v1` and `X-v2`; a name search for `N`
/// resolves to channel `UC-N`.
pub(crate) fn youtube_fixture(request: &ApiRequest) -> Result<Value, GatewayError> {
    Ok(match request {
        ApiRequest::VideoCategories { .. } => categories_page(&[("10", "Music"), ("20", "Gaming")]),
        ApiRequest::SearchVideos { channel_id, .. } => search_page(
            &[&format!("{channel_id}-v1"), &format!("{channel_id}-v2")],
            None,
        ),
        ApiRequest::VideosById { ids } => json!({
            "items": ids
                .iter()
                .map(|id| {
                    let channel = id.rsplit_once("-v").map(|(c, _)| c).unwrap_or("UCx");
                    video_item(id, channel, "10")
                })
                .collect::<Vec<_>>()
        }),
        ApiRequest::SearchChannels { query } => json!({
            "regionCode": "US",
            "items": [{
                "id": { "kind": "youtube#channel", "channelId": format!("UC-{query}") },
                "snippet": {
                    "title": query,
                    "description": format!("{query} channel"),
                    "thumbnails": { "high": { "url": format!("https://img/{query}.jpg") } }
                }
            }]
        }),
        ApiRequest::ChannelsById { ids } => json!({
            "items": ids
                .iter()
                .map(|id| json!({
                    "id": id,
                    "snippet": {
                        "title": format!("Title of {id}"),
                        "description": "refreshed",
                        "country": "PL",
                        "thumbnails": { "default": { "url": "https://img/default.jpg" } }
                    },
                    "statistics": { "subscriberCount": "1000", "videoCount": "12", "viewCount": "99999" }
                }))
                .collect::<Vec<_>>()
        }),
    })
}

pub(crate) fn categories_page(entries: &[(&str, &str)]) -> Value {
    json!({
        "items": entries
            .iter()
            .map(|(id, title)| json!({ "id": id, "snippet": { "title": title } }))
            .collect::<Vec<_>>()
    })
}

pub(crate) fn search_page(video_ids: &[&str], next_page_token: Option<&str>) -> Value {
    let mut page = json!({
        "items": video_ids
            .iter()
            .map(|id| json!({ "id": { "kind": "youtube#video", "videoId": id } }))
            .collect::<Vec<_>>()
    });
    if let Some(token) = next_page_token {
        page["nextPageToken"] = json!(token);
    }
    page
}

pub(crate) fn video_item(video_id: &str, channel_id: &str, category_id: &str) -> Value {
    json!({
        "id": video_id,
        "snippet": {
            "title": format!("Video {video_id}"),
            "description": "description",
            "categoryId": category_id,
            "channelTitle": format!("Channel {channel_id}"),
            "channelId": channel_id,
            "publishedAt": "2024-03-01T12:00:00Z",
            "thumbnails": {
                "default": { "url": format!("https://img/{video_id}/default.jpg") },
                "high": { "url": format!("https://img/{video_id}/high.jpg") }
            }
        },
        "statistics": { "viewCount": "1500", "likeCount": "20", "commentCount": "3" }
    })
}

pub(crate) fn quota_error(credential: &CredentialHandle) -> GatewayError {
    GatewayError::QuotaExceeded {
        credential: credential.ordinal(),
        reason: "quotaExceeded".into(),
    }
}
