//! Error types

use thiserror::Error;

/// Upstream fetch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Upstream returned 429, never retried by the fetch layer
    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    /// Timeout, connection failure or 5xx
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    /// 4xx other than 429, or a malformed payload
    #[error("Permanent upstream failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Durable cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type FetchResult<T> = Result<T, FetchError>;
pub type CacheResult<T> = Result<T, CacheError>;
