//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the engine's invariants over generated operation sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheEngine;
use crate::config::CacheConfig;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;

fn test_config(max_entries: usize) -> CacheConfig {
    CacheConfig {
        default_ttl: Duration::from_secs(300),
        cleanup_interval: Duration::from_secs(300),
        max_entries,
        stale_ttl: Duration::from_secs(60),
        tag_version_ttl: Duration::from_secs(3600),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

/// Keys spread over a few namespaces, as the catalog uses them
fn namespaced_key_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("product"), Just("category"), Just("stats"), Just("productx")],
        "[a-z0-9]{1,8}",
    )
        .prop_map(|(ns, id)| format!("{}:{}", ns, id))
}

fn tag_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,6}", 1..4)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: u32 },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), any::<u32>()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // *For any* sequence of SET operations, the number of entries SHALL never
    // exceed max_entries after a call returns.
    #[test]
    fn prop_capacity_enforcement(
        keys in prop::collection::vec(valid_key_strategy(), 1..200),
        max_entries in 1usize..40,
    ) {
        runtime().block_on(async {
            let cache = CacheEngine::new(test_config(max_entries)).unwrap();

            for (i, key) in keys.iter().enumerate() {
                cache.set(key, &i, None).await.unwrap();
                let len = cache.len().await;
                prop_assert!(len <= max_entries, "Cache size {} exceeds max {}", len, max_entries);
                prop_assert!(len > 0, "An insert must survive its own eviction pass");
            }
            Ok(())
        })?;
    }

    // *For any* set of keys, invalidate("product:*") SHALL remove exactly the
    // matching keys, report that count, and keep everything else.
    #[test]
    fn prop_pattern_invalidation_is_exact(
        keys in prop::collection::hash_set(namespaced_key_strategy(), 0..60)
    ) {
        runtime().block_on(async {
            let cache = CacheEngine::new(test_config(TEST_MAX_ENTRIES)).unwrap();
            for key in &keys {
                cache.set(key, &1, None).await.unwrap();
            }

            let expected: HashSet<&String> =
                keys.iter().filter(|k| k.starts_with("product:")).collect();
            let removed = cache.invalidate("product:*").await.unwrap();
            prop_assert_eq!(removed, expected.len());

            let remaining: HashSet<String> = cache.keys(None).await.unwrap().into_iter().collect();
            for key in &keys {
                prop_assert_eq!(remaining.contains(key), !expected.contains(key));
            }
            Ok(())
        })?;
    }

    // *For any* cache contents, clear() SHALL leave size 0 and a second clear()
    // SHALL remove nothing.
    #[test]
    fn prop_clear_is_idempotent(keys in prop::collection::hash_set(valid_key_strategy(), 0..50)) {
        runtime().block_on(async {
            let cache = CacheEngine::new(test_config(TEST_MAX_ENTRIES)).unwrap();
            for key in &keys {
                cache.set(key, &"v", None).await.unwrap();
            }

            prop_assert_eq!(cache.clear().await, keys.len());
            prop_assert_eq!(cache.len().await, 0);
            prop_assert_eq!(cache.clear().await, 0);
            Ok(())
        })?;
    }

    // *For any* tag set, after invalidate_tags the next tagged_cache call with
    // the same tags (in any order) SHALL run its producer again.
    #[test]
    fn prop_tag_invalidation_forces_recompute(
        key in valid_key_strategy(),
        tags in tag_set_strategy(),
    ) {
        runtime().block_on(async {
            let cache = CacheEngine::new(test_config(TEST_MAX_ENTRIES)).unwrap();
            let calls = Arc::new(AtomicUsize::new(0));

            let producer = |calls: Arc<AtomicUsize>| move || async move {
                Ok(calls.fetch_add(1, Ordering::SeqCst))
            };

            let first: usize = cache
                .tagged_cache(&key, &tags, producer(calls.clone()), None)
                .await
                .unwrap();
            let cached: usize = cache
                .tagged_cache(&key, &tags, producer(calls.clone()), None)
                .await
                .unwrap();
            prop_assert_eq!(first, cached);
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);

            let mut reversed = tags.clone();
            reversed.reverse();
            cache.invalidate_tags(&reversed).await.unwrap();

            let recomputed: usize = cache
                .tagged_cache(&key, &tags, producer(calls.clone()), None)
                .await
                .unwrap();
            prop_assert_eq!(calls.load(Ordering::SeqCst), 2);
            prop_assert_ne!(recomputed, first);
            Ok(())
        })?;
    }

    // *For any* sequence of operations, the hit and miss counters SHALL match
    // the outcome of every GET.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        runtime().block_on(async {
            let cache = CacheEngine::new(test_config(TEST_MAX_ENTRIES)).unwrap();
            let mut expected_hits: u64 = 0;
            let mut expected_misses: u64 = 0;

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, &value, None).await.unwrap();
                    }
                    CacheOp::Get { key } => match cache.get::<u32>(&key).await.unwrap() {
                        Some(_) => expected_hits += 1,
                        None => expected_misses += 1,
                    },
                    CacheOp::Delete { key } => {
                        cache.delete(&key).await;
                    }
                }
            }

            let stats = cache.stats().await;
            prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
            prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
            prop_assert_eq!(stats.total_entries, cache.len().await, "Total entries mismatch");
            Ok(())
        })?;
    }
}

// == Concurrent Operation Correctness ==
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // *For any* set of concurrent reads and writes, every read SHALL return a
    // value some writer stored, and the capacity bound SHALL hold afterwards.
    #[test]
    fn prop_concurrent_operation_correctness(
        operations in prop::collection::vec(cache_op_strategy(), 10..60)
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let cache = CacheEngine::new(test_config(20)).unwrap();
            let written: HashSet<u32> = operations
                .iter()
                .filter_map(|op| match op {
                    CacheOp::Set { value, .. } => Some(*value),
                    _ => None,
                })
                .collect();
            let written = Arc::new(written);

            let mut handles = vec![];
            for op in operations {
                let cache = cache.clone();
                let written = written.clone();
                handles.push(tokio::spawn(async move {
                    match op {
                        CacheOp::Set { key, value } => {
                            cache.set(&key, &value, None).await.map_err(|e| e.to_string())
                        }
                        CacheOp::Get { key } => match cache.get::<u32>(&key).await {
                            Ok(Some(value)) if !written.contains(&value) => {
                                Err(format!("Read unknown value {} for '{}'", value, key))
                            }
                            Ok(_) => Ok(()),
                            Err(e) => Err(e.to_string()),
                        },
                        CacheOp::Delete { key } => {
                            cache.delete(&key).await;
                            Ok(())
                        }
                    }
                }));
            }

            for handle in handles {
                let result = handle.await.expect("Task should not panic");
                prop_assert!(result.is_ok(), "Concurrent operation failed: {:?}", result);
            }

            prop_assert!(cache.len().await <= 20, "Cache should not exceed max entries");
            cache.close().await;
            Ok(())
        })?;
    }
}
