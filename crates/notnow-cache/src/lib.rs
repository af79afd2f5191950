//! Local cache for the notnow bridge.
//!
//! Provides:
//! - `JsonCache` - Fail-soft JSON reads and guarded writes over any backend
//! - Storage implementations (memory, file, SQLite)

pub mod json;
pub mod storage;

pub use json::{CacheWrite, JsonCache};
