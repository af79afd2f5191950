//! Data model shared by every bridge component.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Public profile of a signed-in user.
///
/// This is the only user data that crosses the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Human readable name, if the provider knows one.
    pub display_name: Option<String>,
    /// Stable unique id; scopes the remote collection.
    pub uid: String,
    /// Account email, if any.
    pub email: Option<String>,
}

/// Full user record as reported by an identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub provider_id: Option<String>,
    pub email_verified: bool,
}

impl From<&ProviderUser> for Identity {
    fn from(user: &ProviderUser) -> Self {
        Self {
            display_name: user.display_name.clone(),
            uid: user.uid.clone(),
            email: user.email.clone(),
        }
    }
}

/// Authentication state of the bridge.
///
/// The bootstrap condition before the provider has reported anything is
/// modelled as `Option::<SessionState>::None` by the owners of this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn(Identity),
}

impl SessionState {
    /// The signed-in identity, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedOut => None,
            Self::SignedIn(identity) => Some(identity),
        }
    }

    /// Uid of the signed-in identity, if any.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.identity().map(|i| i.uid.as_str())
    }
}

/// Path of a per-user remote collection: `users/{uid}/{collection}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    #[must_use]
    pub fn for_user(uid: &str, collection: &str) -> Self {
        Self(format!("users/{uid}/{collection}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error building a [`RemoteDocument`] from an application record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no string `id` field")]
    MissingId,
}

/// A document in a remote collection.
///
/// Serialized flat, the same shape the application core sends:
/// `{"id": "...", ...fields}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteDocument {
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Split an application record into id and remaining fields.
    ///
    /// # Errors
    /// Returns error if the record is not an object with a string `id`.
    pub fn from_record(record: Value) -> Result<Self, RecordError> {
        let Value::Object(mut fields) = record else {
            return Err(RecordError::NotAnObject);
        };
        match fields.remove("id") {
            Some(Value::String(id)) => Ok(Self { id, fields }),
            _ => Err(RecordError::MissingId),
        }
    }
}

/// Kind of change reported by a change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// A raw change record as delivered by a remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub kind: ChangeType,
    pub id: String,
    /// Document contents after the change (before it, for removals).
    pub data: Map<String, Value>,
}

/// Change event forwarded to the application core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub document: RemoteDocument,
}

impl From<DocumentChange> for ChangeEvent {
    fn from(change: DocumentChange) -> Self {
        Self {
            change_type: change.kind,
            document: RemoteDocument::new(change.id, change.data),
        }
    }
}
