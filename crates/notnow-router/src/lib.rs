//! Channel router for the notnow bridge.
//!
//! Provides:
//! - `ChannelRouter` - Bind handlers to an application instance's outbound ports
//! - `PortHandler` - Handler trait, with `handler_fn` for async closures

pub mod handler;
pub mod router;

pub use handler::{FnHandler, HandlerError, PortHandler, handler_fn};
pub use router::{ChannelRouter, FailureReporter, HandlerFailure, RouterError, RouterHandle};
