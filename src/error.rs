//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Config Error Enum ==
/// Startup configuration failure. Never recovered from at runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its allowed range
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// An environment variable is present but cannot be parsed
    #[error("Cannot parse {var}={value:?}")]
    Parse { var: &'static str, value: String },
}

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty, too long, reserved or contains forbidden characters
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Per-call TTL out of range
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Empty tag set or malformed tag
    #[error("Invalid tags: {0}")]
    InvalidTags(String),

    /// Empty or uncompilable glob pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Key not found in cache (admin surface only; the engine reports misses as `None`)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Value could not be converted to its stored JSON form
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error returned by a caller-supplied producer, passed through untouched
    #[error(transparent)]
    Producer(anyhow::Error),

    /// Engine constructed with an invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// True for errors caused by bad caller input.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidKey(_)
                | CacheError::InvalidTtl(_)
                | CacheError::InvalidTags(_)
                | CacheError::InvalidPattern(_)
        )
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            err if err.is_invalid_argument() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_is_transparent() {
        let err = CacheError::Producer(anyhow::anyhow!("database unavailable"));
        assert_eq!(err.to_string(), "database unavailable");
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn test_invalid_argument_classification() {
        assert!(CacheError::InvalidKey("k".into()).is_invalid_argument());
        assert!(CacheError::InvalidTtl("0".into()).is_invalid_argument());
        assert!(CacheError::InvalidTags("empty".into()).is_invalid_argument());
        assert!(CacheError::InvalidPattern("empty".into()).is_invalid_argument());
        assert!(!CacheError::NotFound("k".into()).is_invalid_argument());
    }

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (CacheError::NotFound("key".to_string()), StatusCode::NOT_FOUND),
            (CacheError::InvalidKey("bad".to_string()), StatusCode::BAD_REQUEST),
            (CacheError::InvalidPattern("".to_string()), StatusCode::BAD_REQUEST),
            (
                CacheError::Producer(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.into_response().status(), expected_status);
        }
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::Invalid {
            field: "max_entries",
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration for max_entries: must be at least 1"
        );
    }
}
