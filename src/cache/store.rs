//! Entry Store Module
//!
//! Keyed storage of cache entries. Expiry, eviction and statistics live in the
//! components that drive the store; this type only holds entries.

use std::collections::HashMap;

use crate::cache::CacheEntry;

// == Entry Store ==
/// HashMap-backed key -> entry table.
///
/// Not synchronized on its own: the engine wraps it in a lock and every
/// mutator (request path, sweeper, capacity guard) goes through that lock.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
}

impl EntryStore {
    // == Constructor ==
    /// Creates an empty store with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    // == Put ==
    /// Stores an entry, replacing any previous one under the same key.
    pub fn put(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    // == Get ==
    /// Returns the entry under `key`, expired or not.
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Delete ==
    /// Removes an entry. Returns true if the key existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    /// Removes every entry and returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Iterate ==
    /// Iterates over all entries. Callers holding `&self` see a consistent view;
    /// collect keys first when deleting during a pass.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Removes all entries matching `predicate` in a single pass.
    /// Returns the removed keys.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str, &CacheEntry) -> bool,
    {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.entries.remove(key);
        }
        keys
    }
}
