//! Expiry Sweeper
//!
//! Background task that periodically removes expired cache entries, bounding
//! memory for keys that are written but never read again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{current_timestamp_ms, CacheCounters, EntryStore};

/// Removes every entry whose `expires_at <= now` in one pass. Returns the count.
pub fn sweep_expired(store: &mut EntryStore, now: u64) -> usize {
    store.remove_where(|_, entry| entry.is_expired_at(now)).len()
}

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The task holds the store's write lock for the whole pass, the same lock the
/// request path uses for mutation. Abort the returned handle to stop it.
pub fn spawn_sweeper(
    store: Arc<RwLock<EntryStore>>,
    counters: Arc<CacheCounters>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting expiry sweeper"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut store_guard = store.write().await;
                sweep_expired(&mut store_guard, current_timestamp_ms())
            };

            if removed > 0 {
                counters.record_expired_removed(removed);
                info!(removed, "Expiry sweep removed entries");
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
