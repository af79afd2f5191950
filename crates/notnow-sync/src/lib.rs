//! Remote document sync for the notnow bridge.
//!
//! Provides:
//! - `RemoteSyncService` - Session-scoped listener plus debounced batch writes
//! - `WriteQueue` - The write path's `Quiescent`/`Pending` debounce state
//! - `ListenerHandle` - Synchronously cancellable change forwarding
//! - `MemoryRemoteStore` - In-process remote store (feature `memory`)

pub mod debounce;
pub mod listener;
pub mod service;
pub mod store;

pub use debounce::{CommitError, CommitResult, CommitTicket, DiscardReason, WritePhase};
pub use listener::{ListenerHandle, ListenerId};
pub use service::{RemoteSyncService, SyncError, SyncPhase, SyncSettings};
#[cfg(feature = "memory")]
pub use store::{CommitRecord, MemoryRemoteStore};
