//! Error types for the Gravatar proxy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    MissingHash,
    Upstream(u16),
    Transport(Box<reqwest::Error>),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::MissingHash => write!(f, "Missing hash parameter"),
            ProxyError::Upstream(status) => write!(f, "Upstream returned status {}", status),
            ProxyError::Transport(err) => write!(f, "Upstream request failed: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Transport(err) => Some(err.as_ref()),
            ProxyError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Transport(Box::new(err))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(err: url::ParseError) -> Self {
        ProxyError::Config(format!("invalid URL: {}", err))
    }
}

impl From<kv_blob_cache::CacheError> for ProxyError {
    fn from(err: kv_blob_cache::CacheError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProxyError::MissingHash => (StatusCode::BAD_REQUEST, "Missing hash parameter"),
            ProxyError::Upstream(status) => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "Failed to fetch avatar",
            ),
            other => {
                tracing::error!(error = %other, "Error fetching Gravatar");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
