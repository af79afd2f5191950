//! Session manager for tracking authentication state.

use std::sync::{Arc, Mutex, Weak};

use futures::StreamExt;
use notnow_core::{
    ChannelSender, FireMsg, Identity, ProviderUser, SessionObserver, SessionState,
    traits::{AuthError, IdentityProvider},
};
use tokio::{sync::watch, task::JoinHandle};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Sign-in failed: {0}")]
    SignIn(#[source] AuthError),
    #[error("Sign-out failed: {0}")]
    SignOut(#[source] AuthError),
}

/// Session manager for one application instance.
///
/// Owns the authoritative [`SessionState`]. Transitions arrive from the
/// provider's push stream or from [`sign_in`](Self::sign_in) and
/// [`sign_out`](Self::sign_out); each effective transition is handed to the
/// registered observers, in order, and then announced on `fire2Elm`.
pub struct SessionManager<P>
where
    P: IdentityProvider,
{
    provider: Arc<P>,
    fire: ChannelSender,
    state: watch::Sender<Option<SessionState>>,
    observers: Mutex<Vec<Arc<dyn SessionObserver>>>,
    auth_task: Mutex<Option<JoinHandle<()>>>,
}

impl<P> SessionManager<P>
where
    P: IdentityProvider + 'static,
{
    /// Create a new session manager announcing transitions on `fire`.
    #[must_use]
    pub fn new(provider: Arc<P>, fire: ChannelSender) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            provider,
            fire,
            state,
            observers: Mutex::new(Vec::new()),
            auth_task: Mutex::new(None),
        }
    }

    /// Register an observer for future transitions.
    pub fn observe(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(observer);
    }

    /// Start following the provider's auth state.
    ///
    /// Calling this again replaces the previous subscription.
    pub fn start(self: &Arc<Self>) {
        let this: Weak<Self> = Arc::downgrade(self);
        let mut changes = self.provider.auth_state_changes();
        let task = tokio::spawn(async move {
            while let Some(user) = changes.next().await {
                let Some(manager) = this.upgrade() else {
                    break;
                };
                manager.apply(user.as_ref());
            }
            tracing::debug!("auth state stream ended");
        });

        let previous = self
            .auth_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop following the provider's auth state.
    pub fn stop(&self) {
        let task = self
            .auth_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Current state; `None` until the provider has reported once.
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionState>> {
        self.state.subscribe()
    }

    /// Wait until the provider has reported an initial state.
    pub async fn resolved(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        let state = rx.wait_for(Option::is_some).await.ok().and_then(|s| s.clone());
        state.unwrap_or(SessionState::SignedOut)
    }

    /// Run an interactive sign-in.
    ///
    /// Failures are returned as-is and never retried; the state is unchanged.
    ///
    /// # Errors
    /// Returns error if the provider exchange fails.
    pub async fn sign_in(&self) -> Result<Identity, SessionError> {
        match self.provider.sign_in_interactive().await {
            Ok(user) => {
                self.apply(Some(&user));
                Ok(Identity::from(&user))
            }
            Err(e) => {
                tracing::warn!("sign-in failed: {e}");
                Err(SessionError::SignIn(e))
            }
        }
    }

    /// Revoke the session locally, then at the provider.
    ///
    /// The local session is revoked even if the provider call fails.
    ///
    /// # Errors
    /// Returns error if the provider sign-out fails.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.apply(None);
        self.provider.sign_out().await.map_err(|e| {
            tracing::warn!("provider sign-out failed: {e}");
            SessionError::SignOut(e)
        })
    }

    /// Apply a provider report. Returns whether the state changed.
    fn apply(&self, user: Option<&ProviderUser>) -> bool {
        let next = user.map_or(SessionState::SignedOut, |u| {
            SessionState::SignedIn(Identity::from(u))
        });

        // Held for the whole transition so observers and announcements stay ordered.
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let changed = self.state.send_if_modified(|current| {
            if current.as_ref() == Some(&next) {
                false
            } else {
                *current = Some(next.clone());
                true
            }
        });
        if !changed {
            tracing::trace!("auth state unchanged");
            return false;
        }

        for observer in observers.iter() {
            observer.on_transition(&next);
        }

        let msg = match &next {
            SessionState::SignedIn(identity) => {
                tracing::info!(uid = %identity.uid, "user signed in");
                FireMsg::UserLoggedIn {
                    user: identity.clone(),
                }
            }
            SessionState::SignedOut => {
                tracing::info!("user signed out");
                FireMsg::UserNotLoggedIn {}
            }
        };
        if let Err(e) = self.fire.send_msg(&msg) {
            tracing::warn!("failed to announce session change: {e}");
        }
        true
    }
}

impl<P> Drop for SessionManager<P>
where
    P: IdentityProvider,
{
    fn drop(&mut self) {
        if let Ok(mut task) = self.auth_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
