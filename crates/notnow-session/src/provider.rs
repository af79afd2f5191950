//! In-memory identity provider.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use futures::{StreamExt, future};
use notnow_core::{
    ProviderUser,
    traits::{AuthError, AuthStream, IdentityProvider},
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

#[derive(Debug, Clone)]
enum AuthSnapshot {
    Unresolved,
    Resolved(Option<ProviderUser>),
}

/// Scriptable identity provider.
///
/// Auth state stays unresolved until the first [`push`](Self::push), so
/// subscribers see nothing until then. Interactive sign-ins consume queued
/// results; with nothing queued the exchange is cancelled.
pub struct MemoryIdentityProvider {
    state: watch::Sender<AuthSnapshot>,
    sign_in_results: Mutex<VecDeque<Result<ProviderUser, AuthError>>>,
    sign_out_error: Mutex<Option<AuthError>>,
}

impl MemoryIdentityProvider {
    /// A provider that has not yet resolved its auth state.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthSnapshot::Unresolved);
        Self {
            state,
            sign_in_results: Mutex::new(VecDeque::new()),
            sign_out_error: Mutex::new(None),
        }
    }

    /// A provider already resolved as signed out.
    #[must_use]
    pub fn signed_out() -> Self {
        let provider = Self::new();
        provider.push(None);
        provider
    }

    /// A provider already resolved as signed in.
    #[must_use]
    pub fn signed_in(user: ProviderUser) -> Self {
        let provider = Self::new();
        provider.push(Some(user));
        provider
    }

    /// Push an auth state to all subscribers.
    pub fn push(&self, user: Option<ProviderUser>) {
        self.state.send_replace(AuthSnapshot::Resolved(user));
    }

    /// Queue the outcome of the next interactive sign-in.
    pub fn queue_sign_in(&self, result: Result<ProviderUser, AuthError>) {
        self.sign_in_results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
    }

    /// Make the next sign-out fail.
    pub fn fail_next_sign_out(&self, error: AuthError) {
        *self
            .sign_out_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn auth_state_changes(&self) -> AuthStream {
        WatchStream::new(self.state.subscribe())
            .filter_map(|snapshot| {
                future::ready(match snapshot {
                    AuthSnapshot::Unresolved => None,
                    AuthSnapshot::Resolved(user) => Some(user),
                })
            })
            .boxed()
    }

    async fn sign_in_interactive(&self) -> Result<ProviderUser, AuthError> {
        let next = self
            .sign_in_results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        let user = next.unwrap_or(Err(AuthError::Cancelled))?;
        self.push(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let error = self
            .sign_out_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(error) = error {
            return Err(error);
        }
        self.push(None);
        Ok(())
    }
}
