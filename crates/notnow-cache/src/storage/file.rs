//! File-backed cache storage.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use notnow_core::traits::{CacheError, CacheStore};
use tokio::sync::Mutex;

const FILE_NAME: &str = "cache.json";

/// Durable cache kept as one JSON object file.
///
/// The file is read once on first access and rewritten on every write via a
/// temporary file and rename. A missing or unreadable file starts empty.
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileCache {
    /// Create a cache backed by the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Default cache location under the platform data directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notnow")
            .join(FILE_NAME)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> BTreeMap<String, String> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "cache file unreadable: {e}");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "cache file corrupt, starting empty: {e}");
            BTreeMap::new()
        })
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let entries = guard.get_or_insert_with(BTreeMap::new);
        entries.insert(key.to_string(), value);
        self.flush(entries).await
    }
}
