//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and expiry metadata.
///
/// Entries are never mutated in place; a write replaces the whole entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// End of the fresh window for stale-while-revalidate entries
    pub fresh_until: Option<u64>,
    /// Approximate footprint of the serialized value in bytes
    pub size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry written at `now` that expires after `ttl`.
    pub fn new(value: Value, now: u64, ttl: Duration) -> Self {
        let size_bytes = serde_json::to_vec(&value).map(|v| v.len()).unwrap_or(0);
        Self {
            value,
            stored_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            fresh_until: None,
            size_bytes,
        }
    }

    /// Creates a stale-while-revalidate entry: fresh for `ttl`, then served stale
    /// for `stale_ttl` more before it expires.
    pub fn with_stale_window(value: Value, now: u64, ttl: Duration, stale_ttl: Duration) -> Self {
        let mut entry = Self::new(value, now, ttl + stale_ttl);
        entry.fresh_until = Some(now.saturating_add(ttl.as_millis() as u64));
        entry
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// True once a stale-while-revalidate entry has left its fresh window.
    /// Plain entries are never stale, they simply expire.
    pub fn is_stale_at(&self, now: u64) -> bool {
        self.fresh_until.map_or(false, |fresh| now >= fresh)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds; 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
