//! Cache Module
//!
//! In-process caching engine with TTL expiry, bounded capacity, tag-based
//! invalidation, stale-while-revalidate and warmup.

mod capacity;
mod engine;
mod entry;
pub mod keys;
mod lock;
mod stats;
mod store;
mod tags;
mod warmup;

#[cfg(test)]
mod property_tests;

use std::time::Duration;

// Re-export public types
pub use capacity::CapacityGuard;
pub use engine::CacheEngine;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use keys::KeyPattern;
pub use stats::{CacheCounters, CacheStats};
pub use store::EntryStore;
pub use tags::TagVersionRegistry;
pub use warmup::{WarmupEntry, WarmupFailure, WarmupReport};

// == Public Constants ==
/// Maximum allowed key length in characters
pub const MAX_KEY_LENGTH: usize = 250;

/// Longest TTL accepted per call
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);
