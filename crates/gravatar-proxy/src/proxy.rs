//! Upstream avatar fetching

use crate::error::{ProxyError, Result};
use crate::types::AvatarRequest;
use kv_blob_cache::{CachedImage, DEFAULT_CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// HTTP client for fetching avatars from Gravatar
pub struct GravatarFetcher {
    client: Client,
    base_url: Url,
}

impl GravatarFetcher {
    /// Create a fetcher for `base_url` (e.g. `https://secure.gravatar.com`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ProxyError::Config(format!(
                "upstream URL cannot be a base: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Build `<base>/avatar/<hash>?s=..&d=..&r=..`
    pub fn avatar_url(&self, request: &AvatarRequest) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("avatar")
                .push(&request.hash);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("s", &request.size)
            .append_pair("d", &request.default_image)
            .append_pair("r", &request.rating);
        url
    }

    /// Fetch an avatar, returning its bytes and content type.
    ///
    /// A non-2xx answer is [`ProxyError::Upstream`]; a request that cannot
    /// complete is [`ProxyError::Transport`]. No retries.
    pub async fn fetch(&self, request: &AvatarRequest) -> Result<CachedImage> {
        let url = self.avatar_url(request);
        debug!(url = %url, "Fetching avatar from upstream");

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Failed to fetch avatar");
            return Err(ProxyError::Upstream(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = response.bytes().await?.to_vec();

        debug!(
            size = data.len(),
            content_type = %content_type,
            "Fetched avatar from upstream"
        );

        Ok(CachedImage { data, content_type })
    }
}
