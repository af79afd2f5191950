//! Traits for the bridge's external collaborators.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CollectionPath, DocumentChange, ProviderUser, RemoteDocument, SessionState};

/// Push stream of auth states: `None` means signed out.
pub type AuthStream = futures::stream::BoxStream<'static, Option<ProviderUser>>;

/// Push stream of change batches for one collection, in delivery order.
pub type ChangeStream = futures::stream::BoxStream<'static, Vec<DocumentChange>>;

/// Local cache error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache error: {0}")]
    Internal(String),
}

/// Trait for local persistent cache backends.
///
/// A flat string-to-string mapping; last write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the stored text for a key.
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store text under a key, replacing any previous value.
    async fn write(&self, key: &str, value: String) -> Result<(), CacheError>;
}

/// Remote store error.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
    #[error("Remote error: {0}")]
    Internal(String),
}

/// Trait for remote document stores with change notification.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Write all documents as one atomic batch of full overwrites.
    async fn commit(
        &self,
        path: &CollectionPath,
        documents: Vec<RemoteDocument>,
    ) -> Result<(), RemoteError>;

    /// Overwrite a single document.
    async fn set_document(
        &self,
        path: &CollectionPath,
        document: RemoteDocument,
    ) -> Result<(), RemoteError>;

    /// Open a realtime subscription on a collection.
    ///
    /// Dropping the stream ends the subscription.
    fn on_change(&self, path: &CollectionPath) -> ChangeStream;
}

/// Identity provider error.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Sign-in cancelled")]
    Cancelled,
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),
}

/// Trait for session/identity providers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Push notifications of auth state, starting with the current state
    /// once the provider has resolved it.
    fn auth_state_changes(&self) -> AuthStream;

    /// Run an interactive sign-in exchange.
    async fn sign_in_interactive(&self) -> Result<ProviderUser, AuthError>;

    /// Revoke the provider session.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Receives session transitions synchronously, in order.
///
/// Implementations must not block; spawn work instead.
pub trait SessionObserver: Send + Sync {
    fn on_transition(&self, state: &SessionState);
}
