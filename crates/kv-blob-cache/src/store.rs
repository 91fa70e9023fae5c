//! Key/value store backends

use crate::error::{CacheError, Result};
use crate::types::KvConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// A string-keyed store holding text values with per-entry expiry
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that the store expires after `ttl_secs`
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
}

/// Body returned by the KV REST API for every command
#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the Upstash / Vercel KV REST API.
///
/// Commands are posted as JSON arrays (`["GET", "key"]`) to the base URL with
/// a bearer token.
pub struct RestKvStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RestKvStore {
    pub fn new(config: &KvConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: config.rest_url.trim_end_matches('/').to_string(),
            token: config.rest_token.clone(),
        })
    }

    async fn command(&self, command: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;

        let status = response.status();
        let body: RestResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(CacheError::Store(error));
        }
        if !status.is_success() {
            return Err(CacheError::Store(format!(
                "KV REST API returned status {}",
                status
            )));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl KvStore for RestKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!(key, "KV GET");
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(value) => Ok(Some(value)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        debug!(key, size = value.len(), ttl_secs, "KV SET");
        self.command(json!(["SET", key, value, "EX", ttl_secs]))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::future::IntoFuture;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    const TOKEN: &str = "test-token";

    #[derive(Default)]
    struct FakeRedis {
        values: Mutex<HashMap<String, String>>,
        commands: Mutex<Vec<Value>>,
    }

    async fn handle_command(
        State(redis): State<Arc<FakeRedis>>,
        headers: HeaderMap,
        Json(command): Json<Vec<Value>>,
    ) -> Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", TOKEN))
            .unwrap_or(false);
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "WRONGPASS invalid or missing auth token" })),
            )
                .into_response();
        }

        redis.commands.lock().unwrap().push(Value::Array(command.clone()));

        let name = command[0].as_str().unwrap_or_default().to_string();
        let key = command[1].as_str().unwrap_or_default().to_string();
        match name.as_str() {
            "GET" => {
                let value = redis.values.lock().unwrap().get(&key).cloned();
                Json(json!({ "result": value })).into_response()
            }
            "SET" => {
                let value = command[2].as_str().unwrap_or_default().to_string();
                redis.values.lock().unwrap().insert(key, value);
                Json(json!({ "result": "OK" })).into_response()
            }
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "ERR unknown command" })),
            )
                .into_response(),
        }
    }

    async fn start_fake_redis() -> (SocketAddr, Arc<FakeRedis>) {
        let redis = Arc::new(FakeRedis::default());
        let app = Router::new()
            .route("/", post(handle_command))
            .with_state(redis.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, app).into_future());
        (addr, redis)
    }

    fn store_for(addr: SocketAddr, token: &str) -> RestKvStore {
        let config = KvConfig {
            rest_url: format!("http://{}/", addr),
            rest_token: token.to_string(),
        };
        RestKvStore::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (addr, redis) = start_fake_redis().await;
        let store = store_for(addr, TOKEN);

        store.set("gravatar:abc", "SGVsbG8=", 86400).await.unwrap();
        let value = store.get("gravatar:abc").await.unwrap();
        assert_eq!(value.as_deref(), Some("SGVsbG8="));

        let commands = redis.commands.lock().unwrap();
        assert_eq!(
            commands[0],
            json!(["SET", "gravatar:abc", "SGVsbG8=", "EX", 86400])
        );
        assert_eq!(commands[1], json!(["GET", "gravatar:abc"]));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (addr, _redis) = start_fake_redis().await;
        let store = store_for(addr, TOKEN);

        assert_eq!(store.get("gravatar:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_body_becomes_store_error() {
        let (addr, _redis) = start_fake_redis().await;
        let store = store_for(addr, "wrong-token");

        let err = store.get("gravatar:abc").await.unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));
        assert!(err.to_string().contains("WRONGPASS"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_http_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = store_for(addr, TOKEN);
        let err = store.set("k", "v", 10).await.unwrap_err();
        assert!(matches!(err, CacheError::Http(_)));
    }
}
