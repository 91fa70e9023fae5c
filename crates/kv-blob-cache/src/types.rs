//! Cache types

use crate::error::{CacheError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

/// Content type assumed when none is known
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// An image blob together with the content type it was served with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Text form of a [`CachedImage`] as written to the store
#[derive(Serialize, Deserialize)]
struct StoredImage {
    content_type: String,
    data: String,
}

impl CachedImage {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }

    /// Encode into the store's text representation (JSON envelope, base64 body)
    pub fn encode(&self) -> Result<String> {
        let stored = StoredImage {
            content_type: self.content_type.clone(),
            data: STANDARD.encode(&self.data),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    /// Decode a stored value.
    ///
    /// Accepts the JSON envelope written by [`CachedImage::encode`] as well as a
    /// bare base64 string (entries written without a content type), which is
    /// served as [`DEFAULT_CONTENT_TYPE`]. A stored content type that cannot be
    /// sent back as a header value is an encoding error.
    pub fn decode(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.starts_with('{') {
            let stored: StoredImage = serde_json::from_str(value)?;
            if HeaderValue::from_str(&stored.content_type).is_err() {
                return Err(CacheError::Encoding(format!(
                    "invalid content type {:?}",
                    stored.content_type
                )));
            }
            let content_type = if stored.content_type.is_empty() {
                DEFAULT_CONTENT_TYPE.to_string()
            } else {
                stored.content_type
            };
            return Ok(Self {
                data: STANDARD.decode(stored.data)?,
                content_type,
            });
        }

        Ok(Self {
            data: STANDARD.decode(value)?,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        })
    }
}

/// Connection settings for the KV REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvConfig {
    pub rest_url: String,
    pub rest_token: String,
}

impl KvConfig {
    /// Read `KV_REST_API_URL` and `KV_REST_API_TOKEN` from the environment.
    ///
    /// Returns `None` when either is missing, which disables caching.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(
            std::env::var("KV_REST_API_URL").ok(),
            std::env::var("KV_REST_API_TOKEN").ok(),
        )
    }

    pub fn from_vars(rest_url: Option<String>, rest_token: Option<String>) -> Option<Self> {
        let rest_url = rest_url.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())?;
        let rest_token = rest_token
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())?;
        Some(Self {
            rest_url,
            rest_token,
        })
    }
}

/// Result of a store connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Statistics about cache usage since startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub available: bool,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}
