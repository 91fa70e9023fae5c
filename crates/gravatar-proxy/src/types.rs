//! Core types for the Gravatar proxy

use crate::error::{ProxyError, Result};
use kv_blob_cache::{CacheStats, KvBlobCache, KvConfig};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_SIZE: &str = "80";
pub const DEFAULT_IMAGE: &str = "mp";
pub const DEFAULT_RATING: &str = "g";

/// A validated avatar request with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarRequest {
    pub hash: String,
    pub size: String,
    pub default_image: String,
    pub rating: String,
}

impl AvatarRequest {
    /// Parse `hash`, `s`, `d` and `r` from a raw query string.
    ///
    /// The first occurrence of a parameter wins. Empty optional parameters
    /// fall back to their defaults; a missing or empty hash is rejected.
    pub fn from_query(query: Option<&str>) -> Result<Self> {
        let mut hash = None;
        let mut size = None;
        let mut default_image = None;
        let mut rating = None;

        for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            let slot = match &*name {
                "hash" => &mut hash,
                "s" => &mut size,
                "d" => &mut default_image,
                "r" => &mut rating,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let hash = hash
            .filter(|h| !h.is_empty())
            .ok_or(ProxyError::MissingHash)?;

        Ok(Self {
            hash,
            size: or_default(size, DEFAULT_SIZE),
            default_image: or_default(default_image, DEFAULT_IMAGE),
            rating: or_default(rating, DEFAULT_RATING),
        })
    }

    pub fn cache_key(&self) -> String {
        KvBlobCache::cache_key(&self.hash, &self.size, &self.default_image, &self.rating)
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Where a served avatar came from, reported in `X-Cache`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Configuration for the Gravatar proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub upstream_base_url: String,
    pub upstream_timeout: Duration,
    pub kv: Option<KvConfig>,
    pub kv_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            upstream_base_url: "https://secure.gravatar.com".to_string(),
            upstream_timeout: Duration::from_secs(10),
            kv: None,
            kv_timeout: Duration::from_secs(5),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
