//! In-memory cache storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use notnow_core::traits::{CacheError, CacheStore};

/// In-memory cache implementation.
///
/// Useful for tests and headless hosts.
/// Data is lost on restart.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a cache pre-populated with raw entries.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| CacheError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|e| CacheError::Internal(e.to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }
}
