//! Fail-open blob cache on top of a [`KvStore`]

use crate::error::Result;
use crate::store::{KvStore, RestKvStore};
use crate::types::{CacheStats, CachedImage, KvConfig, KvStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Expiry applied to every cached blob (24 hours)
pub const CACHE_TTL_SECS: u64 = 60 * 60 * 24;

const KEY_PREFIX: &str = "gravatar";
const PROBE_KEY: &str = "test:connection";
const PROBE_VALUE: &str = "ok";
const PROBE_TTL_SECS: u64 = 10;

/// A blob cache backed by an optional remote key/value store.
///
/// Without a store every lookup is a miss and every write a no-op. With a
/// store, failures are logged and counted but never returned.
pub struct KvBlobCache {
    store: Option<Arc<dyn KvStore>>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl KvBlobCache {
    /// Create a cache that talks to `store`
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_store(Some(store))
    }

    /// Create a cache with no backing store
    pub fn disabled() -> Self {
        Self::with_store(None)
    }

    /// Create a cache from optional REST API settings
    pub fn from_config(config: Option<&KvConfig>, timeout: Duration) -> Result<Self> {
        match config {
            Some(config) => {
                let store = RestKvStore::new(config, timeout)?;
                Ok(Self::new(Arc::new(store)))
            }
            None => Ok(Self::disabled()),
        }
    }

    fn with_store(store: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Whether a store is configured
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Build the cache key for an avatar request.
    ///
    /// Fields are percent-encoded before joining, so a `:` inside a field
    /// cannot make two different requests share a key.
    pub fn cache_key(hash: &str, size: &str, default_image: &str, rating: &str) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            KEY_PREFIX,
            urlencoding::encode(hash),
            urlencoding::encode(size),
            urlencoding::encode(default_image),
            urlencoding::encode(rating)
        )
    }

    /// Look up a blob; any failure is reported as a miss
    pub async fn get(&self, key: &str) -> Option<CachedImage> {
        let store = self.store.as_ref()?;

        let value = match store.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache get failed");
                return None;
            }
        };

        match CachedImage::decode(&value) {
            Ok(image) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, size = image.data.len(), "Cache hit");
                Some(image)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a blob with the fixed TTL; failures are logged and dropped
    pub async fn set(&self, key: &str, image: &CachedImage) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let encoded = match image.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Failed to encode blob for cache");
                return;
            }
        };

        match store.set(key, &encoded, CACHE_TTL_SECS).await {
            Ok(()) => debug!(key = %key, size = image.data.len(), "Cached blob"),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache set failed");
            }
        }
    }

    /// Write and read back a short-lived probe key
    pub async fn check_connection(&self) -> KvStatus {
        let Some(store) = self.store.as_ref() else {
            return KvStatus {
                connected: false,
                message: Some(
                    "KV store is not configured. Set KV_REST_API_URL and KV_REST_API_TOKEN."
                        .to_string(),
                ),
            };
        };

        let probe = async {
            store.set(PROBE_KEY, PROBE_VALUE, PROBE_TTL_SECS).await?;
            store.get(PROBE_KEY).await
        };

        match probe.await {
            Ok(Some(value)) if value == PROBE_VALUE => KvStatus {
                connected: true,
                message: None,
            },
            Ok(_) => KvStatus {
                connected: false,
                message: Some("KV store connection test failed.".to_string()),
            },
            Err(e) => {
                warn!(error = %e, "KV connection test error");
                KvStatus {
                    connected: false,
                    message: Some("KV store connection test errored.".to_string()),
                }
            }
        }
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            available: self.is_available(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
