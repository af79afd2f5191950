//! Storage implementations.

pub mod file;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileCache;

#[cfg(feature = "memory")]
pub use memory::MemoryCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCache;
