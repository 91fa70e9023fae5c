//! Error types for the key/value blob cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Http(Box<reqwest::Error>),
    Store(String),
    Encoding(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Http(err) => write!(f, "HTTP error: {}", err),
            CacheError::Store(msg) => write!(f, "Store error: {}", msg),
            CacheError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Encoding(err.to_string())
    }
}

impl From<base64::DecodeError> for CacheError {
    fn from(err: base64::DecodeError) -> Self {
        CacheError::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
