//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.
//! Field validation is left to the cache engine so the rules live in one place.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Request body for `PUT /cache`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// Any JSON value
    pub value: Value,
    /// Optional TTL in milliseconds (engine default when absent)
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl SetRequest {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

/// Request body for `POST /invalidate`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Glob with `*` wildcards, e.g. `product:*`
    pub pattern: String,
}

/// Request body for `POST /invalidate-tags`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateTagsRequest {
    pub tags: Vec<String>,
}

/// Query string for `GET /cache`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysQuery {
    #[serde(default)]
    pub pattern: Option<String>,
}
