//! Fail-open blob cache over a remote key/value store
//!
//! Stores binary blobs (with their content type) in a text-only key/value
//! store such as Vercel KV / Upstash Redis. Every entry is written with a fixed
//! TTL and expiry is left entirely to the store. Store failures never surface
//! to callers: reads degrade to a miss and writes become no-ops.

mod cache;
mod error;
mod store;
mod types;

pub use cache::{KvBlobCache, CACHE_TTL_SECS};
pub use error::{CacheError, Result};
pub use store::{KvStore, RestKvStore};
pub use types::{CacheStats, CachedImage, KvConfig, KvStatus, DEFAULT_CONTENT_TYPE};
