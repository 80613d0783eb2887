//! Capacity Guard Module
//!
//! Keeps the entry count under `max_entries` by evicting a batch of the
//! entries closest to expiry. Expiry order stands in for access order.

use crate::cache::keys::is_tag_version_key;
use crate::cache::EntryStore;

/// Fraction of `max_entries` evicted per overflow event
const EVICTION_FRACTION: f64 = 0.1;

// == Capacity Guard ==
#[derive(Debug, Clone, Copy)]
pub struct CapacityGuard {
    max_entries: usize,
    batch_size: usize,
}

impl CapacityGuard {
    // == Constructor ==
    /// `max_entries` must be at least 1 (validated with the configuration).
    pub fn new(max_entries: usize) -> Self {
        let batch_size = ((max_entries as f64 * EVICTION_FRACTION).ceil() as usize).max(1);
        Self {
            max_entries,
            batch_size,
        }
    }

    /// Number of entries removed when the limit is reached.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    // == Enforce ==
    /// Makes room for one insert. When the store is full, removes the
    /// `batch_size` entries with the soonest `expires_at` and returns their keys.
    ///
    /// Tag version counters sort after every regular entry so they are only
    /// evicted when nothing else is left.
    pub fn enforce(&self, store: &mut EntryStore) -> Vec<String> {
        if store.len() < self.max_entries {
            return Vec::new();
        }

        let mut candidates: Vec<(bool, u64, &String)> = store
            .iter()
            .map(|(key, entry)| (is_tag_version_key(key), entry.expires_at, key))
            .collect();

        let batch = self.batch_size.min(candidates.len());
        if batch < candidates.len() {
            candidates.select_nth_unstable(batch);
        }
        let victims: Vec<String> = candidates[..batch]
            .iter()
            .map(|(_, _, key)| (*key).clone())
            .collect();

        for key in &victims {
            store.delete(key);
        }
        victims
    }
}
