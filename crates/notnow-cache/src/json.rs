//! JSON-safe adapter over a [`CacheStore`].

use notnow_core::traits::{CacheError, CacheStore};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Outcome of [`JsonCache::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    /// The value was serialized and stored.
    Stored,
    /// Key or value was missing; nothing was written.
    Skipped,
}

/// Typed, fail-soft access to a string cache.
///
/// Reads never fail: anything missing or undecodable yields the caller's
/// default. Writes serialize to JSON text.
pub struct JsonCache<S> {
    store: S,
}

impl<S: CacheStore> JsonCache<S> {
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying backend.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Read and decode `key`, or return `default`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.store.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                tracing::warn!(key, "cache read failed: {e}");
                return default;
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::debug!(key, "cached value undecodable, using default: {e}");
            default
        })
    }

    /// Raw stored text for `key`, or `default`.
    pub async fn get_raw_or(&self, key: &str, default: &str) -> String {
        match self.store.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => default.to_string(),
            Err(e) => {
                tracing::warn!(key, "cache read failed: {e}");
                default.to_string()
            }
        }
    }

    /// Serialize `value` and store it under `key`.
    ///
    /// An empty key or a value that serializes to `null` is skipped.
    ///
    /// # Errors
    /// Returns error if serialization or the backend write fails.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<CacheWrite, CacheError> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Internal(e.to_string()))?;
        if key.is_empty() || value.is_null() {
            tracing::warn!(key, %value, "invalid args for cache set, skipped");
            return Ok(CacheWrite::Skipped);
        }
        self.store.write(key, Value::to_string(&value)).await?;
        tracing::trace!(key, "cache entry stored");
        Ok(CacheWrite::Stored)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryCache;

    #[tokio::test]
    async fn test_empty_cache_returns_default() {
        let cache = JsonCache::new(MemoryCache::new());
        let grains: Vec<Value> = cache.get("grains", Vec::new()).await;
        assert!(grains.is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = JsonCache::new(MemoryCache::new());
        let stored = cache.set("grains", &json!([{"id": "a"}])).await.unwrap();
        assert_eq!(stored, CacheWrite::Stored);

        let grains: Value = cache.get("grains", json!([])).await;
        assert_eq!(grains, json!([{"id": "a"}]));
    }

    #[tokio::test]
    async fn test_round_trip_of_assorted_values() {
        let cache = JsonCache::new(MemoryCache::new());
        let values = [
            json!(0),
            json!(-1.5),
            json!("text with \"quotes\""),
            json!(false),
            json!({"nested": {"list": [1, "two", null]}}),
            json!([]),
        ];
        for (i, value) in values.iter().enumerate() {
            let key = format!("k{i}");
            cache.set(&key, value).await.unwrap();
            assert_eq!(&cache.get(&key, Value::Null).await, value);
        }
    }

    #[tokio::test]
    async fn test_corrupt_entry_falls_back_to_default() {
        let cache = JsonCache::new(MemoryCache::with_entries([("grains", "[{oops")]));
        let grains: Value = cache.get("grains", json!([])).await;
        assert_eq!(grains, json!([]));
    }

    #[tokio::test]
    async fn test_wrong_shape_falls_back_to_default() {
        let cache = JsonCache::new(MemoryCache::with_entries([("count", "\"seven\"")]));
        assert_eq!(cache.get("count", 7_u32).await, 7);
    }

    #[tokio::test]
    async fn test_missing_key_or_value_is_skipped() {
        let cache = JsonCache::new(MemoryCache::new());
        assert_eq!(cache.set("", &json!([1])).await.unwrap(), CacheWrite::Skipped);
        assert_eq!(cache.set("grains", &Value::Null).await.unwrap(), CacheWrite::Skipped);
        assert_eq!(cache.set("grains", &None::<u8>).await.unwrap(), CacheWrite::Skipped);
        assert_eq!(cache.store().read("grains").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_raw_read() {
        let cache = JsonCache::new(MemoryCache::with_entries([("labels", "[\"x\"]")]));
        assert_eq!(cache.get_raw_or("labels", "[]").await, "[\"x\"]");
        assert_eq!(cache.get_raw_or("userLabels", "[]").await, "[]");
    }
}
