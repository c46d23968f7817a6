use std::time::Duration;
use thiserror::Error;

/// Main error type for cache operations surfaced to callers
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of a single layer call.
///
/// The orchestrator absorbs these: a failing layer contributes nothing to the
/// current operation and the cascade moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayerError {
    #[error("layer unavailable: {0}")]
    Unavailable(String),

    #[error("layer call timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Result type alias for layer and remote store calls
pub type LayerResult<T> = std::result::Result<T, LayerError>;
