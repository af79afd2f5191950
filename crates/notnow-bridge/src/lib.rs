//! Port bridge between the notnow application core and its host services.
//!
//! Provides:
//! - `Bridge` - Reference handlers wired to an application instance's ports
//! - `AppFlags` - Boot flags read from the local cache plus the host window size
//! - `Navigator` - Host history contract, with `MemoryHistory`

pub mod assembly;
pub mod flags;
pub mod navigation;

pub use assembly::{Bridge, BridgeError, Collaborators, reference_ports};
pub use flags::{AppFlags, WindowSize};
pub use navigation::{MemoryHistory, Navigator};
