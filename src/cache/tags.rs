//! Tag Version Registry Module
//!
//! Version counters for tag sets, stored as ordinary entries under the
//! `tags:` namespace of the entry store.

use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::cache::{CacheEntry, EntryStore};

// == Tag Version Registry ==
#[derive(Debug, Clone, Copy)]
pub struct TagVersionRegistry {
    ttl: Duration,
}

impl TagVersionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    // == Get Version ==
    /// Current version of the tag set under `tag_key`, 0 if absent.
    ///
    /// A live counter is re-stored with a fresh TTL so it outlives the entries
    /// written under it.
    pub fn get_version(&self, store: &mut EntryStore, tag_key: &str, now: u64) -> u64 {
        let version = match store.get(tag_key) {
            Some(entry) if !entry.is_expired_at(now) => entry.value.as_u64(),
            _ => return 0,
        };

        match version {
            Some(version) => {
                store.put(tag_key.to_string(), self.entry(version, now));
                version
            }
            None => {
                warn!(key = tag_key, "Corrupt tag version entry, treating as version 0");
                0
            }
        }
    }

    // == Bump Version ==
    /// Increments the counter and returns the new version. The caller holds the
    /// store's write lock, which makes read-increment-write atomic.
    pub fn bump_version(&self, store: &mut EntryStore, tag_key: &str, now: u64) -> u64 {
        let next = self.get_version(store, tag_key, now).saturating_add(1);
        store.put(tag_key.to_string(), self.entry(next, now));
        next
    }

    fn entry(&self, version: u64, now: u64) -> CacheEntry {
        CacheEntry::new(json!(version), now, self.ttl)
    }
}
