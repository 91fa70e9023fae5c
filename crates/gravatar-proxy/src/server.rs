//! HTTP server for avatar proxy endpoints
//!
//! Provides /avatar (and its /api/gravatar alias), /status/kv and /health.

use crate::error::Result;
use crate::proxy::GravatarFetcher;
use crate::types::{AvatarRequest, CacheStatus, HealthResponse};
use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use kv_blob_cache::{CachedImage, KvBlobCache, KvStatus};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

/// Browser 24h, shared caches 7d, stale-while-revalidate 30d
pub const CACHE_CONTROL: &str =
    "public, max-age=86400, s-maxage=604800, stale-while-revalidate=2592000";

const X_CACHE: &str = "x-cache";

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: KvBlobCache,
    pub fetcher: GravatarFetcher,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: KvBlobCache, fetcher: GravatarFetcher) -> Self {
        Self {
            cache,
            fetcher,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// An avatar ready to be sent, with where it came from
struct ServedAvatar {
    image: CachedImage,
    cache_status: CacheStatus,
}

impl IntoResponse for ServedAvatar {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.image.content_type),
                (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
                (
                    HeaderName::from_static(X_CACHE),
                    self.cache_status.as_str().to_string(),
                ),
            ],
            Body::from(self.image.data),
        )
            .into_response()
    }
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/avatar", get(get_avatar))
        .route("/api/gravatar", get(get_avatar))
        .route("/status/kv", get(kv_status))
        .route("/api/status/kv", get(kv_status))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

/// KV store connectivity check
async fn kv_status(State(state): State<SharedState>) -> Json<KvStatus> {
    Json(state.cache.check_connection().await)
}

/// Get an avatar by hash, from cache when possible
async fn get_avatar(State(state): State<SharedState>, RawQuery(query): RawQuery) -> Response {
    match serve_avatar(&state, query.as_deref()).await {
        Ok(served) => served.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Validate, look up, fetch on miss, then store
async fn serve_avatar(state: &ServerState, query: Option<&str>) -> Result<ServedAvatar> {
    let request = AvatarRequest::from_query(query)?;
    let key = request.cache_key();

    if let Some(image) = state.cache.get(&key).await {
        return Ok(ServedAvatar {
            image,
            cache_status: CacheStatus::Hit,
        });
    }

    let image = state.fetcher.fetch(&request).await?;

    state.cache.set(&key, &image).await;
    debug!(key = %key, "Served avatar from upstream");

    Ok(ServedAvatar {
        image,
        cache_status: CacheStatus::Miss,
    })
}

/// Turn a handler panic into a plain 500
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "Request handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
