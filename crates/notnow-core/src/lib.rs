//! Core abstractions for the notnow port bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `Ports` - Named inbound/outbound channels of an application-core instance
//! - `FireMsg` - Tagged messages sent on `fire2Elm`
//! - `BridgeConfig` - Settings shared by the bridge components
//! - Collaborator traits for cache, remote store and identity provider

pub mod config;
pub mod ports;
pub mod protocol;
pub mod traits;
pub mod types;

pub use config::BridgeConfig;
pub use ports::{AppInstance, ChannelSender, InboundSender, PortError, PortHost, Ports};
pub use protocol::FireMsg;
pub use traits::{CacheStore, IdentityProvider, RemoteStore, SessionObserver};
pub use types::{
    ChangeEvent, ChangeType, CollectionPath, DocumentChange, Identity, ProviderUser,
    RemoteDocument, SessionState,
};
