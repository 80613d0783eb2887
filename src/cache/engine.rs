//! Cache Engine Module
//!
//! Composition root tying the entry store, capacity guard, tag registry and
//! sweeper together behind the public caching operations.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{join_all, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::keys::{
    is_tag_version_key, tag_set_key, validate_key, versioned_key, KeyPattern,
};
use crate::cache::lock::mutex_lock;
use crate::cache::warmup::{WarmupEntry, WarmupFailure, WarmupReport};
use crate::cache::{
    CacheCounters, CacheEntry, CacheStats, CapacityGuard, EntryStore, TagVersionRegistry, MAX_TTL,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, ConfigError, Result};
use crate::tasks::spawn_sweeper;

const SOURCE: &str = "cache::engine";

// == Cache Engine ==
/// In-process cache for expensive catalog and aggregation queries.
///
/// Cloning is cheap and every clone shares the same entries. The engine must be
/// created inside a tokio runtime because it starts the expiry sweeper.
///
/// `cached` and `tagged_cache` do not deduplicate concurrent misses: two
/// callers missing the same key at once both run their producer and the last
/// write wins. Background refreshes started by `stale_while_revalidate` are
/// deduplicated per key.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: CacheConfig,
    store: Arc<RwLock<EntryStore>>,
    counters: Arc<CacheCounters>,
    capacity: CapacityGuard,
    tags: TagVersionRegistry,
    /// Keys with a background refresh in flight
    refreshing: Mutex<HashMap<String, AbortHandle>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl CacheEngine {
    // == Constructor ==
    /// Validates `config` and starts the sweeper.
    pub fn new(config: CacheConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let store = Arc::new(RwLock::new(EntryStore::with_capacity(
            config.max_entries.min(4096),
        )));
        let counters = Arc::new(CacheCounters::new());
        let sweeper = spawn_sweeper(store.clone(), counters.clone(), config.cleanup_interval);

        info!(
            max_entries = config.max_entries,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            cleanup_interval_ms = config.cleanup_interval.as_millis() as u64,
            "Cache engine started"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                capacity: CapacityGuard::new(config.max_entries),
                tags: TagVersionRegistry::new(config.tag_version_ttl),
                config,
                store,
                counters,
                refreshing: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(Some(sweeper)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl` (default TTL when `None`).
    /// Runs the capacity guard first.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        let ttl = self.resolve_ttl(ttl)?;
        let value = serde_json::to_value(value)?;

        self.inner
            .store_entry(key.to_string(), CacheEntry::new(value, current_timestamp_ms(), ttl))
            .await;
        debug!(key, ttl_ms = ttl.as_millis() as u64, "Stored entry");
        Ok(())
    }

    // == Get ==
    /// Returns the live value under `key`. Expired entries are removed on the
    /// way out; entries that do not decode as `T` are logged and reported absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        Ok(self.inner.read::<T>(key).await.map(|(value, _)| value))
    }

    // == Delete ==
    /// Removes `key`. Returns true if it existed. Malformed keys are a no-op.
    pub async fn delete(&self, key: &str) -> bool {
        if let Err(err) = validate_key(key) {
            debug!(key, error = %err, "Ignoring delete of malformed key");
            return false;
        }
        self.inner.store.write().await.delete(key)
    }

    // == Clear ==
    /// Removes every entry, tag versions included. Returns the number removed.
    pub async fn clear(&self) -> usize {
        let removed = self.inner.store.write().await.clear();
        info!(removed, "Cache cleared");
        removed
    }

    /// Number of entries physically present, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Cached ==
    /// Compute-if-absent: returns the cached value on a hit, otherwise runs
    /// `producer`, stores its result and returns it.
    ///
    /// A producer error is returned as [`CacheError::Producer`] and nothing is
    /// stored; an existing entry is left untouched.
    pub async fn cached<T, F, Fut>(&self, key: &str, producer: F, ttl: Option<Duration>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        validate_key(key)?;
        let ttl = self.resolve_ttl(ttl)?;
        self.compute_if_absent(key.to_string(), producer, ttl).await
    }

    async fn compute_if_absent<T, F, Fut>(&self, key: String, producer: F, ttl: Duration) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some((value, _)) = self.inner.read::<T>(&key).await {
            return Ok(value);
        }

        let value = producer().await.map_err(CacheError::Producer)?;
        let json = serde_json::to_value(&value)?;
        self.inner
            .store_entry(key, CacheEntry::new(json, current_timestamp_ms(), ttl))
            .await;
        Ok(value)
    }

    // == Stale While Revalidate ==
    /// Returns a cached value immediately when one exists. Once the value is
    /// older than `ttl` it is still served for up to `stale_ttl` more, and each
    /// such stale hit schedules one background refresh. Without a cached value
    /// the producer runs inline.
    ///
    /// Background refresh failures are logged and leave the stale value in place.
    /// Entries written by `set` or `cached` have no stale window: once they
    /// expire this call recomputes inline.
    pub async fn stale_while_revalidate<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
        stale_ttl: Option<Duration>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        validate_key(key)?;
        let ttl = self.resolve_ttl(ttl)?;
        let stale_ttl = match stale_ttl {
            Some(stale_ttl) => check_ttl(stale_ttl)?,
            None => self.inner.config.stale_ttl,
        };

        if let Some((value, stale)) = self.inner.read::<T>(key).await {
            if stale {
                self.inner
                    .schedule_refresh(key.to_string(), producer, ttl, stale_ttl);
            }
            return Ok(value);
        }

        let value = producer().await.map_err(CacheError::Producer)?;
        let json = serde_json::to_value(&value)?;
        self.inner
            .store_entry(
                key.to_string(),
                CacheEntry::with_stale_window(json, current_timestamp_ms(), ttl, stale_ttl),
            )
            .await;
        Ok(value)
    }

    // == Tagged Cache ==
    /// Compute-if-absent under the current version of `tags`. After
    /// [`CacheEngine::invalidate_tags`] the same call misses and recomputes.
    ///
    /// The entry lives for at most `tag_version_ttl`, so it never outlives the
    /// version counter it was written under. `key` plus the `:v{n}` suffix must
    /// fit within the key length bound.
    pub async fn tagged_cache<T, F, Fut, I, S>(
        &self,
        key: &str,
        tags: I,
        producer: F,
        ttl: Option<Duration>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        validate_key(key)?;
        let tag_key = tag_set_key(tags)?;
        let ttl = self.resolve_ttl(ttl)?.min(self.inner.config.tag_version_ttl);

        let version = {
            let mut store = self.inner.store.write().await;
            self.inner
                .tags
                .get_version(&mut store, &tag_key, current_timestamp_ms())
        };

        self.compute_if_absent(versioned_key(key, version)?, producer, ttl)
            .await
    }

    // == Invalidate Tags ==
    /// Bumps the version of `tags` and returns the new version. Entries written
    /// under older versions become unreachable and expire on their own.
    pub async fn invalidate_tags<I, S>(&self, tags: I) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tag_key = tag_set_key(tags)?;

        let version = {
            let mut store = self.inner.store.write().await;
            self.inner.enforce_capacity(&mut store);
            self.inner
                .tags
                .bump_version(&mut store, &tag_key, current_timestamp_ms())
        };

        info!(tags = %tag_key, version, "Tag set invalidated");
        Ok(version)
    }

    // == Invalidate Pattern ==
    /// Deletes every key matching the `*` glob and returns how many were
    /// removed. Tag version counters are never matched.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::compile(pattern)?;

        let removed = self
            .inner
            .store
            .write()
            .await
            .remove_where(|key, _| !is_tag_version_key(key) && pattern.matches(key));

        info!(pattern = pattern.as_str(), removed = removed.len(), "Pattern invalidation");
        Ok(removed.len())
    }

    // == Warmup ==
    /// Runs every producer concurrently and stores each result under its key.
    /// Failures are logged and reported, never returned as an error.
    pub async fn warmup(&self, entries: Vec<WarmupEntry>) -> WarmupReport {
        let total = entries.len();
        let results = join_all(entries.into_iter().map(|entry| self.warm_entry(entry))).await;

        let mut report = WarmupReport::default();
        for (key, result) in results {
            match result {
                Ok(()) => report.stored.push(key),
                Err(err) => {
                    warn!(key = %key, error = %err, "Warmup entry failed");
                    report.failed.push(WarmupFailure {
                        key,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            total,
            stored = report.stored.len(),
            failed = report.failed.len(),
            "Cache warmup finished"
        );
        report
    }

    async fn warm_entry(&self, entry: WarmupEntry) -> (String, Result<()>) {
        let WarmupEntry { key, ttl, producer } = entry;

        let result = async {
            validate_key(&key)?;
            let ttl = self.resolve_ttl(ttl)?;
            let value = AssertUnwindSafe(producer())
                .catch_unwind()
                .await
                .map_err(|_| CacheError::Producer(anyhow::anyhow!("warmup producer panicked")))?
                .map_err(CacheError::Producer)?;

            self.inner
                .store_entry(key.clone(), CacheEntry::new(value, current_timestamp_ms(), ttl))
                .await;
            Ok::<(), CacheError>(())
        }
        .await;

        (key, result)
    }

    // == Introspection ==
    /// Live keys, optionally filtered by a glob, sorted. Tag version counters
    /// are not listed.
    pub async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let pattern = pattern.map(KeyPattern::compile).transpose()?;
        let now = current_timestamp_ms();

        let mut keys: Vec<String> = self
            .inner
            .store
            .read()
            .await
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && !is_tag_version_key(key))
            .filter(|(key, _)| pattern.as_ref().map_or(true, |p| p.matches(key)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Time left before `key` expires, `None` when absent or expired.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        validate_key(key).ok()?;
        let now = current_timestamp_ms();
        let store = self.inner.store.read().await;
        store
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| Duration::from_millis(entry.ttl_remaining_ms(now)))
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let now = current_timestamp_ms();
        let mut stats = CacheStats::from_counters(&self.inner.counters, &self.inner.config);

        let store = self.inner.store.read().await;
        for (key, entry) in store.iter() {
            stats.total_entries += 1;
            if is_tag_version_key(key) {
                stats.tag_version_entries += 1;
            }
            if entry.is_expired_at(now) {
                stats.expired_entries += 1;
            } else {
                stats.valid_entries += 1;
            }
            stats.approximate_bytes += key.len() + entry.size_bytes;
        }
        stats
    }

    // == Close ==
    /// Stops the sweeper and aborts in-flight background refreshes. Once this
    /// returns no background work runs. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweeper = mutex_lock(&self.inner.sweeper, SOURCE, "close.sweeper").take();
        if let Some(handle) = sweeper {
            handle.abort();
            let _ = handle.await;
        }

        let refreshes: Vec<AbortHandle> = mutex_lock(&self.inner.refreshing, SOURCE, "close.refreshing")
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &refreshes {
            handle.abort();
        }

        info!(aborted_refreshes = refreshes.len(), "Cache engine closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Result<Duration> {
        match ttl {
            Some(ttl) => check_ttl(ttl),
            None => Ok(self.inner.config.default_ttl),
        }
    }
}

fn check_ttl(ttl: Duration) -> Result<Duration> {
    if ttl.as_millis() == 0 {
        return Err(CacheError::InvalidTtl("ttl must be at least 1ms".to_string()));
    }
    if ttl > MAX_TTL {
        return Err(CacheError::InvalidTtl(format!(
            "ttl must not exceed {}s",
            MAX_TTL.as_secs()
        )));
    }
    Ok(ttl)
}

impl EngineInner {
    /// Runs the capacity guard, then writes the entry.
    async fn store_entry(&self, key: String, entry: CacheEntry) {
        let mut store = self.store.write().await;
        self.enforce_capacity(&mut store);
        store.put(key, entry);
    }

    fn enforce_capacity(&self, store: &mut EntryStore) {
        let evicted = self.capacity.enforce(store);
        if !evicted.is_empty() {
            self.counters.record_evictions(evicted.len());
            debug!(evicted = evicted.len(), "Capacity reached, evicted batch");
        }
    }

    /// Raw lookup. Returns the value and whether it is stale; removes the entry
    /// if it has expired.
    async fn lookup(&self, key: &str) -> Option<(Value, bool)> {
        let now = current_timestamp_ms();
        {
            let store = self.store.read().await;
            match store.get(key) {
                Some(entry) if !entry.is_expired_at(now) => {
                    return Some((entry.value.clone(), entry.is_stale_at(now)));
                }
                None => return None,
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a writer may have replaced the entry.
        let mut store = self.store.write().await;
        if store.get(key).map_or(false, |entry| entry.is_expired_at(now)) {
            store.delete(key);
            self.counters.record_expired_removed(1);
        }
        None
    }

    /// Typed lookup that records the hit or miss.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<(T, bool)> {
        let Some((value, stale)) = self.lookup(key).await else {
            self.counters.record_miss();
            debug!(key, "Cache miss");
            return None;
        };

        match serde_json::from_value::<T>(value) {
            Ok(value) => {
                self.counters.record_hit();
                debug!(key, stale, "Cache hit");
                Some((value, stale))
            }
            Err(err) => {
                self.counters.record_miss();
                warn!(key, error = %err, "Cached value does not decode, treating as miss");
                None
            }
        }
    }

    /// Starts a background refresh for `key` unless one is already running.
    fn schedule_refresh<T, F, Fut>(self: &Arc<Self>, key: String, producer: F, ttl: Duration, stale_ttl: Duration)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        // Held while spawning so the task cannot deregister before it is registered.
        let mut refreshing = mutex_lock(&self.refreshing, SOURCE, "schedule_refresh");
        if refreshing.contains_key(&key) {
            debug!(key = %key, "Refresh already in flight");
            return;
        }

        let inner = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            inner.run_refresh(&task_key, producer, ttl, stale_ttl).await;
            mutex_lock(&inner.refreshing, SOURCE, "finish_refresh").remove(&task_key);
        });
        refreshing.insert(key, handle.abort_handle());
    }

    async fn run_refresh<T, F, Fut>(&self, key: &str, producer: F, ttl: Duration, stale_ttl: Duration)
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let json = match producer().await {
            Ok(value) => serde_json::to_value(&value).map_err(anyhow::Error::from),
            Err(err) => Err(err),
        };

        match json {
            Ok(json) => {
                if self.closed.load(Ordering::Acquire) {
                    return;
                }
                self.store_entry(
                    key.to_string(),
                    CacheEntry::with_stale_window(json, current_timestamp_ms(), ttl, stale_ttl),
                )
                .await;
                self.counters.record_refresh();
                debug!(key, "Background refresh stored");
            }
            Err(err) => {
                self.counters.record_refresh_failure();
                warn!(key, error = %err, "Background refresh failed, keeping stale value");
            }
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let sweeper = self
            .sweeper
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
    }
}
