//! Remote call gateway: request model, transport seam and quota rotation.
//!
//! Every remote operation goes through [`Gateway::call`], which issues the
//! request with the pool's active credential. A `QuotaExceeded` answer makes
//! the gateway rotate to the next credential and re-issue the identical
//! request; this repeats at most once per credential in the pool. Running out
//! of credentials surfaces as `CredentialsExhausted`. Every other failure is
//! returned to the caller unchanged.

pub mod classify;
pub mod operations;
pub mod youtube;

use crate::credentials::{CredentialHandle, CredentialPool};
use crate::error::GatewayError;
use crate::types::Event;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast};

pub use operations::{ChannelDetails, HarvestContext};
pub use youtube::YoutubeApi;

/// Sort order for video searches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchOrder {
    /// Most viewed first
    ViewCount,
    /// Newest first
    Date,
}

impl SearchOrder {
    /// Value of the `order` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOrder::ViewCount => "viewCount",
            SearchOrder::Date => "date",
        }
    }
}

/// One remote operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiRequest {
    /// `channels.list` by identifier
    ChannelsById {
        /// Channel identifiers
        ids: Vec<String>,
    },
    /// `search.list` for channels matching a name
    SearchChannels {
        /// Free-text query
        query: String,
    },
    /// `search.list` for videos of one channel
    SearchVideos {
        /// Channel identifier
        channel_id: String,
        /// Result order
        order: SearchOrder,
        /// Page size (at most 50)
        max_results: u32,
        /// Lower publication bound
        published_after: Option<DateTime<Utc>>,
        /// Upper publication bound
        published_before: Option<DateTime<Utc>>,
        /// Continuation token from the previous page
        page_token: Option<String>,
    },
    /// `videos.list` with snippet and statistics
    VideosById {
        /// Video identifiers (at most 50)
        ids: Vec<String>,
    },
    /// `videoCategories.list` for a region
    VideoCategories {
        /// Two-letter region code
        region_code: String,
    },
}

impl ApiRequest {
    /// Endpoint path relative to the API base URL
    pub fn endpoint(&self) -> &'static str {
        match self {
            ApiRequest::ChannelsById { .. } => "channels",
            ApiRequest::SearchChannels { .. } | ApiRequest::SearchVideos { .. } => "search",
            ApiRequest::VideosById { .. } => "videos",
            ApiRequest::VideoCategories { .. } => "videoCategories",
        }
    }

    /// Query parameters, credential excluded
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            ApiRequest::ChannelsById { ids } => vec![
                ("part", "snippet,contentDetails,statistics".to_string()),
                ("id", ids.join(",")),
            ],
            ApiRequest::SearchChannels { query } => vec![
                ("part", "snippet".to_string()),
                ("q", query.clone()),
                ("type", "channel".to_string()),
            ],
            ApiRequest::SearchVideos {
                channel_id,
                order,
                max_results,
                published_after,
                published_before,
                page_token,
            } => {
                let mut params = vec![
                    ("part", "snippet".to_string()),
                    ("channelId", channel_id.clone()),
                    ("type", "video".to_string()),
                    ("order", order.as_str().to_string()),
                    ("maxResults", max_results.to_string()),
                ];
                if let Some(after) = published_after {
                    params.push(("publishedAfter", rfc3339(after)));
                }
                if let Some(before) = published_before {
                    params.push(("publishedBefore", rfc3339(before)));
                }
                if let Some(token) = page_token {
                    params.push(("pageToken", token.clone()));
                }
                params
            }
            ApiRequest::VideosById { ids } => vec![
                ("part", "snippet,statistics".to_string()),
                ("id", ids.join(",")),
            ],
            ApiRequest::VideoCategories { region_code } => vec![
                ("part", "snippet".to_string()),
                ("regionCode", region_code.clone()),
            ],
        }
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Transport that executes one request with one credential
///
/// Implementations classify their failures into [`GatewayError`]; they never
/// rotate or retry themselves.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Execute `request` using `credential`
    async fn execute(
        &self,
        credential: &CredentialHandle,
        request: &ApiRequest,
    ) -> Result<Value, GatewayError>;
}

/// Issues remote calls through the active credential and rotates on quota
pub struct Gateway {
    api: Arc<dyn RemoteApi>,
    pool: Mutex<CredentialPool>,
    event_tx: Option<broadcast::Sender<Event>>,
    calls_issued: AtomicU64,
}

impl Gateway {
    /// Create a gateway over a transport and a credential pool
    pub fn new(api: Arc<dyn RemoteApi>, pool: CredentialPool) -> Self {
        Self {
            api,
            pool: Mutex::new(pool),
            event_tx: None,
            calls_issued: AtomicU64::new(0),
        }
    }

    /// Emit [`Event::CredentialRotated`] on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Execute one request, rotating credentials on quota exhaustion
    pub async fn call(&self, request: &ApiRequest) -> Result<Value, GatewayError> {
        let mut pool = self.pool.lock().await;
        let max_rotations = pool.len();
        let mut rotations = 0;

        loop {
            let credential = pool.active()?.clone();
            self.calls_issued.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                endpoint = request.endpoint(),
                credential = credential.ordinal(),
                "Issuing remote call"
            );

            match self.api.execute(&credential, request).await {
                Err(GatewayError::QuotaExceeded { reason, .. }) => {
                    if rotations >= max_rotations {
                        return Err(GatewayError::CredentialsExhausted);
                    }
                    tracing::warn!(
                        credential = credential.ordinal(),
                        label = credential.label(),
                        reason = %reason,
                        "Quota exceeded, rotating credential"
                    );
                    let next = pool.rotate().await?.ordinal();
                    rotations += 1;

                    if let Some(tx) = &self.event_tx {
                        tx.send(Event::CredentialRotated {
                            from: credential.ordinal(),
                            to: next,
                        })
                        .ok();
                    }
                }
                other => return other,
            }
        }
    }

    /// Fail early if the pool cannot serve any call
    pub async fn ensure_credentials(&self) -> Result<(), GatewayError> {
        self.pool.lock().await.active().map(|_| ()).map_err(Into::into)
    }

    /// Ordinal of the active credential
    pub async fn active_credential(&self) -> Option<usize> {
        self.pool.lock().await.active_index()
    }

    /// Number of requests handed to the transport, rotations included
    pub fn calls_issued(&self) -> u64 {
        self.calls_issued.load(Ordering::Relaxed)
    }
}
