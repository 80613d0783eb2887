//! Cache Warmup Module
//!
//! Type-erased warmup items and the report returned after a warmup batch.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

type BoxedProducer = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

// == Warmup Entry ==
/// One key to pre-populate, with the producer that computes its value.
pub struct WarmupEntry {
    pub(crate) key: String,
    pub(crate) ttl: Option<Duration>,
    pub(crate) producer: BoxedProducer,
}

impl WarmupEntry {
    /// Creates an entry stored with the engine's default TTL.
    pub fn new<F, Fut, T>(key: impl Into<String>, producer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let producer: BoxedProducer = Box::new(move || {
            async move {
                let value = producer().await?;
                Ok(serde_json::to_value(value)?)
            }
            .boxed()
        });

        Self {
            key: key.into(),
            ttl: None,
            producer,
        }
    }

    /// Overrides the TTL for this entry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for WarmupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmupEntry")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

// == Warmup Report ==
/// Outcome of a warmup batch. Partial success is normal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmupReport {
    /// Keys stored successfully
    pub stored: Vec<String>,
    /// Keys whose producer or validation failed
    pub failed: Vec<WarmupFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmupFailure {
    pub key: String,
    pub error: String,
}

impl WarmupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_entry_serializes_producer_output() {
        let entry = WarmupEntry::new("featured", || async { Ok(vec![1, 2, 3]) })
            .with_ttl(Duration::from_secs(5));

        assert_eq!(entry.key(), "featured");
        assert_eq!(entry.ttl, Some(Duration::from_secs(5)));

        let value = (entry.producer)().await.unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_entry_propagates_producer_error() {
        let entry = WarmupEntry::new("broken", || async {
            Err::<u32, _>(anyhow::anyhow!("query failed"))
        });

        let err = (entry.producer)().await.unwrap_err();
        assert_eq!(err.to_string(), "query failed");
    }

    #[test]
    fn test_report_completeness() {
        let mut report = WarmupReport::default();
        report.stored.push("a".to_string());
        assert!(report.is_complete());

        report.failed.push(WarmupFailure {
            key: "b".to_string(),
            error: "boom".to_string(),
        });
        assert!(!report.is_complete());
    }
}
