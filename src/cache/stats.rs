//! Cache Statistics Module
//!
//! Tracks cache performance metrics and builds the snapshot reported by
//! `CacheEngine::stats`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::config::CacheConfig;

// == Cache Counters ==
/// Monotonic counters shared by the request path and background tasks.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Expired entries physically removed, by the sweeper or on access.
    pub fn record_expired_removed(&self, count: usize) {
        self.expired_removed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expired_removed(&self) -> u64 {
        self.expired_removed.load(Ordering::Relaxed)
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }
}

// == Cache Stats ==
/// Point-in-time summary of the cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Entries physically present, expired ones included
    pub total_entries: usize,
    /// Entries still readable
    pub valid_entries: usize,
    /// Entries past their expiry awaiting the sweeper
    pub expired_entries: usize,
    /// Tag version counters among `total_entries`
    pub tag_version_entries: usize,
    /// Keys plus serialized values, in bytes
    pub approximate_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    /// hits / (hits + misses), 0.0 before any lookup
    pub hit_rate: f64,
    pub config: CacheConfig,
}

impl CacheStats {
    /// Starts a snapshot from the counters; entry figures are filled in by the caller.
    pub fn from_counters(counters: &CacheCounters, config: &CacheConfig) -> Self {
        let hits = counters.hits();
        let misses = counters.misses();
        Self {
            total_entries: 0,
            valid_entries: 0,
            expired_entries: 0,
            tag_version_entries: 0,
            approximate_bytes: 0,
            hits,
            misses,
            evictions: counters.evictions(),
            expired_removed: counters.expired_removed(),
            refreshes: counters.refreshes(),
            refresh_failures: counters.refresh_failures(),
            hit_rate: hit_rate(hits, misses),
            config: config.clone(),
        }
    }
}

// == Hit Rate ==
/// Returns hits / (hits + misses), or 0.0 if no requests have been made.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
