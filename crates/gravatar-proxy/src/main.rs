//! Gravatar Proxy - caching reverse proxy for Gravatar avatars
//!
//! Fetches avatars from Gravatar by email hash and keeps the bytes in a
//! KV store for 24 hours. Runs without a store, just uncached.

mod error;
mod proxy;
mod server;
mod types;

use crate::error::Result;
use crate::proxy::GravatarFetcher;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use kv_blob_cache::{KvBlobCache, KvConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("gravatar_proxy=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Gravatar proxy...");

    let config = load_config();
    info!("Port: {}", config.port);
    info!("Upstream: {}", config.upstream_base_url);
    info!("Upstream timeout: {:?}", config.upstream_timeout);
    match &config.kv {
        Some(kv) => info!("KV cache: {}", kv.rest_url),
        None => info!("KV cache: not configured, serving uncached"),
    }

    let cache = KvBlobCache::from_config(config.kv.as_ref(), config.kv_timeout)?;
    let fetcher = GravatarFetcher::new(&config.upstream_base_url, config.upstream_timeout)?;

    let state: SharedState = Arc::new(ServerState::new(cache, fetcher));

    // Start HTTP server (blocking)
    start_server(state, config.port).await?;

    Ok(())
}

fn load_config() -> ProxyConfig {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let upstream_base_url =
        std::env::var("GRAVATAR_BASE_URL").unwrap_or(defaults.upstream_base_url);

    let upstream_timeout = std::env::var("UPSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.upstream_timeout);

    let kv_timeout = std::env::var("KV_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.kv_timeout);

    ProxyConfig {
        port,
        upstream_base_url,
        upstream_timeout,
        kv: KvConfig::from_env(),
        kv_timeout,
    }
}
