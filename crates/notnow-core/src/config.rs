//! Bridge configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::INBOUND_HISTORY;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Settings shared by the bridge components.
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Per-user remote collection name: `users/{uid}/{collection}`.
    pub collection: String,

    /// Quiescence window for batched remote writes, in milliseconds.
    pub debounce_ms: u64,

    /// Location of the file-backed local cache. `None` picks a platform default.
    pub cache_path: Option<PathBuf>,

    /// Cache key written by `cacheGrainList` and read for boot flags.
    pub grains_key: String,

    /// Cache key written by `setGrainCache`.
    pub grain_cache_key: String,

    /// Messages retained per inbound channel.
    pub inbound_history: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            collection: "grains".to_string(),
            debounce_ms: 1000,
            cache_path: None,
            grains_key: "grains".to_string(),
            grain_cache_key: "grainCache".to_string(),
            inbound_history: INBOUND_HISTORY,
        }
    }
}

impl BridgeConfig {
    /// Parse a (possibly partial) JSON config document.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON for this shape.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overlaid with `NOTNOW_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Overlay values looked up by variable name.
    ///
    /// # Errors
    /// Returns error if a numeric variable does not parse.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(collection) = lookup("NOTNOW_COLLECTION") {
            self.collection = collection;
        }
        if let Some(value) = lookup("NOTNOW_DEBOUNCE_MS") {
            self.debounce_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "NOTNOW_DEBOUNCE_MS",
                value,
            })?;
        }
        if let Some(path) = lookup("NOTNOW_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// The debounce window as a duration.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
