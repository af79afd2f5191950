//! Authentication session tracking for the notnow bridge.
//!
//! Provides:
//! - `SessionManager` - Signed-in/out state machine gating remote work
//! - `MemoryIdentityProvider` - Scriptable provider for tests and headless hosts

pub mod manager;
pub mod provider;

pub use manager::{SessionError, SessionManager};
pub use provider::MemoryIdentityProvider;
