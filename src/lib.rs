//! Catalog Cache - an in-process caching engine for expensive catalog queries
//!
//! Provides TTL expiry, bounded capacity, tag-based invalidation,
//! stale-while-revalidate refresh and cache warmup, plus an admin HTTP surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEngine, WarmupEntry, WarmupReport};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, ConfigError};
