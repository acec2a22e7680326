//! YouTube Data API v3 transport over `reqwest`.

use super::classify::{classify_status, classify_transport};
use super::{ApiRequest, RemoteApi};
use crate::config::ApiConfig;
use crate::credentials::{CredentialHandle, Secret};
use crate::error::{Error, GatewayError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Production [`RemoteApi`] talking to the YouTube Data API
#[derive(Clone, Debug)]
pub struct YoutubeApi {
    client: reqwest::Client,
    base_url: url::Url,
}

impl YoutubeApi {
    /// Build a client from the API settings
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let base_url = url::Url::parse(base)
            .map_err(|e| Error::config(format!("invalid base URL: {e}"), "api.base_url"))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    fn url_for(&self, request: &ApiRequest) -> std::result::Result<url::Url, GatewayError> {
        let raw = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), request.endpoint());
        let mut url = url::Url::parse(&raw).map_err(|e| GatewayError::Fatal(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(request.query());
        Ok(url)
    }
}

#[async_trait]
impl RemoteApi for YoutubeApi {
    async fn execute(
        &self,
        credential: &CredentialHandle,
        request: &ApiRequest,
    ) -> std::result::Result<Value, GatewayError> {
        let url = self.url_for(request)?;

        let mut builder = self.client.get(url);
        builder = match credential.secret() {
            Secret::ApiKey(key) => builder.query(&[("key", key.as_str())]),
            Secret::AccessToken(token) => builder.bearer_auth(token),
        };

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            let error = classify_status(status.as_u16(), &body, credential.ordinal());
            tracing::debug!(
                endpoint = request.endpoint(),
                status = status.as_u16(),
                error = %error,
                "Remote call failed"
            );
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::Malformed(format!("{} response is not JSON: {e}", request.endpoint()))
        })
    }
}
