//! Channel names and the tagged messages carried on `fire2Elm`.

use serde::{Deserialize, Serialize};

use crate::types::{ChangeEvent, Identity};

/// Outbound channel names (application core to bridge).
pub mod outbound {
    pub const ERROR: &str = "error";
    pub const SET_GRAIN_CACHE: &str = "setGrainCache";
    /// Older name for writing the grain list under the `grains` key.
    pub const CACHE_GRAIN_LIST: &str = "cacheGrainList";
    pub const PUSH_URL: &str = "pushUrl";
    pub const REPLACE_STATE: &str = "replaceState";
    pub const NAVIGATE_BACK: &str = "navigateBack";
    pub const SIGN_IN: &str = "signIn";
    pub const SIGN_OUT: &str = "signOut";
    pub const PERSIST_SAVED_GRAIN_LIST: &str = "persistSavedGrainList";

    pub const ALL: [&str; 9] = [
        ERROR,
        SET_GRAIN_CACHE,
        CACHE_GRAIN_LIST,
        PUSH_URL,
        REPLACE_STATE,
        NAVIGATE_BACK,
        SIGN_IN,
        SIGN_OUT,
        PERSIST_SAVED_GRAIN_LIST,
    ];
}

/// Inbound channel names (bridge to application core).
pub mod inbound {
    pub const URL_CHANGED: &str = "urlChanged";
    pub const KEY_DOWN_ON_BODY: &str = "keyDownOnBody";
    pub const FIRE_2_ELM: &str = "fire2Elm";

    pub const ALL: [&str; 3] = [URL_CHANGED, KEY_DOWN_ON_BODY, FIRE_2_ELM];
}

/// Message on the `fire2Elm` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", content = "payload")]
pub enum FireMsg {
    /// A user signed in.
    UserLoggedIn { user: Identity },
    /// No user is signed in.
    UserNotLoggedIn {},
    /// One notification batch from the remote collection, in delivery order.
    GrainChanges { changes: Vec<ChangeEvent> },
}
