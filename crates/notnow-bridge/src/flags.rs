//! Boot flags handed to the application core at startup.

use std::time::{SystemTime, UNIX_EPOCH};

use notnow_cache::JsonCache;
use notnow_core::{BridgeConfig, CacheStore};
use serde::{Deserialize, Serialize};

/// Cache key of the label list.
pub const LABELS_KEY: &str = "labels";
/// Cache key of the user label list.
pub const USER_LABELS_KEY: &str = "userLabels";

const EMPTY_LIST: &str = "[]";

/// Host viewport dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Startup flags.
///
/// List-valued entries carry the raw cached JSON text; the application core
/// decodes them itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFlags {
    /// Milliseconds since the Unix epoch.
    pub now: u64,
    pub grains: String,
    pub labels: String,
    pub user_labels: String,
    /// Supplied by the host; the cache has no say in it.
    pub window_size: WindowSize,
}

impl AppFlags {
    /// Read the flags from the cache, defaulting each list to `"[]"`.
    pub async fn load<S: CacheStore>(
        cache: &JsonCache<S>,
        config: &BridgeConfig,
        now: SystemTime,
        window_size: WindowSize,
    ) -> Self {
        Self {
            now: epoch_millis(now),
            grains: cache.get_raw_or(&config.grains_key, EMPTY_LIST).await,
            labels: cache.get_raw_or(LABELS_KEY, EMPTY_LIST).await,
            user_labels: cache.get_raw_or(USER_LABELS_KEY, EMPTY_LIST).await,
            window_size,
        }
    }
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
