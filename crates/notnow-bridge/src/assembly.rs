//! Composition of the reference channel handlers.

use std::{sync::Arc, time::SystemTime};

use notnow_cache::JsonCache;
use notnow_core::{
    BridgeConfig, CacheStore, IdentityProvider, InboundSender, PortError, PortHost, Ports,
    RemoteStore,
    protocol::{inbound, outbound},
};
use notnow_router::{
    ChannelRouter, HandlerError, HandlerFailure, PortHandler, RouterError, RouterHandle,
    handler_fn,
};
use notnow_session::{SessionError, SessionManager};
use notnow_sync::{CommitError, RemoteSyncService, SyncSettings};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    flags::{AppFlags, WindowSize},
    navigation::Navigator,
};

/// Bridge error.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Port set exposing every channel the reference handlers use.
#[must_use]
pub fn reference_ports(config: &BridgeConfig) -> Ports {
    Ports::new(outbound::ALL, inbound::ALL).with_history_limit(config.inbound_history)
}

/// External collaborators of a [`Bridge`].
pub struct Collaborators<C, R, P> {
    pub cache: C,
    pub remote: Arc<R>,
    pub provider: Arc<P>,
    pub navigator: Arc<dyn Navigator>,
}

/// A bridge attached to one application instance.
///
/// Owns the session manager, the remote sync service (registered as a session
/// observer) and the router handle of the reference handlers.
pub struct Bridge<C, R, P>
where
    P: IdentityProvider + 'static,
{
    config: BridgeConfig,
    ports: Arc<Ports>,
    cache: Arc<JsonCache<C>>,
    session: Arc<SessionManager<P>>,
    sync: RemoteSyncService<R>,
    navigator: Arc<dyn Navigator>,
    router: RouterHandle,
}

impl<C, R, P> Bridge<C, R, P>
where
    C: CacheStore + 'static,
    R: RemoteStore + 'static,
    P: IdentityProvider + 'static,
{
    /// Wire the reference handlers to `host` and start following the session.
    ///
    /// Channels the host does not expose are skipped (see
    /// [`RouterHandle::skipped`]).
    ///
    /// # Errors
    /// Returns error if the host exposes no ports.
    pub fn attach(
        host: &dyn PortHost,
        collaborators: Collaborators<C, R, P>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let Some(ports) = host.ports() else {
            tracing::error!("no ports found, bridge not attached");
            return Err(RouterError::NoPorts.into());
        };
        let Collaborators {
            cache,
            remote,
            provider,
            navigator,
        } = collaborators;

        let fire = InboundSender::new(Arc::clone(&ports)).to(inbound::FIRE_2_ELM);
        let cache = Arc::new(JsonCache::new(cache));
        let session = Arc::new(SessionManager::new(provider, fire.clone()));
        let sync = RemoteSyncService::new(remote, fire, SyncSettings::from(&config));
        session.observe(Arc::new(sync.clone()));

        let router = reference_router(&config, &cache, &session, &sync, &navigator).attach(host)?;
        session.start();

        tracing::info!(
            bound = router.bound().len(),
            skipped = router.skipped().len(),
            "bridge attached"
        );
        Ok(Self {
            config,
            ports,
            cache,
            session,
            sync,
            navigator,
            router,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub const fn ports(&self) -> &Arc<Ports> {
        &self.ports
    }

    #[must_use]
    pub fn cache(&self) -> &JsonCache<C> {
        &self.cache
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<SessionManager<P>> {
        &self.session
    }

    #[must_use]
    pub const fn sync(&self) -> &RemoteSyncService<R> {
        &self.sync
    }

    #[must_use]
    pub fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    #[must_use]
    pub const fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Next handler failure, waiting if none is queued.
    pub async fn next_failure(&mut self) -> Option<HandlerFailure> {
        self.router.next_failure().await
    }

    /// Next queued handler failure, if any.
    pub fn try_next_failure(&mut self) -> Option<HandlerFailure> {
        self.router.try_next_failure()
    }

    /// Boot flags from the cache and the host's current window size.
    pub async fn flags(&self, now: SystemTime, window_size: WindowSize) -> AppFlags {
        AppFlags::load(&self.cache, &self.config, now, window_size).await
    }

    /// Forward a host key event on `keyDownOnBody`.
    ///
    /// # Errors
    /// Returns error if the application exposes no such channel.
    pub fn key_down(&self, event: Value) -> Result<(), BridgeError> {
        Ok(self.ports.send(inbound::KEY_DOWN_ON_BODY, event)?)
    }

    /// Detach all handlers, stop following the session and drop pending writes.
    pub fn shutdown(&mut self) {
        self.router.detach();
        self.session.stop();
        self.sync.shutdown();
        tracing::info!("bridge shut down");
    }
}

/// Navigation target: a bare URL or an object carrying one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UrlPayload {
    Plain(String),
    State {
        #[serde(alias = "href")]
        url: String,
    },
}

impl UrlPayload {
    fn into_url(self) -> String {
        match self {
            Self::Plain(url) | Self::State { url } => url,
        }
    }
}

fn parse_url(payload: Value) -> Result<String, HandlerError> {
    Ok(serde_json::from_value::<UrlPayload>(payload)?.into_url())
}

fn reference_router<C, R, P>(
    config: &BridgeConfig,
    cache: &Arc<JsonCache<C>>,
    session: &Arc<SessionManager<P>>,
    sync: &RemoteSyncService<R>,
    navigator: &Arc<dyn Navigator>,
) -> ChannelRouter
where
    C: CacheStore + 'static,
    R: RemoteStore + 'static,
    P: IdentityProvider + 'static,
{
    let router = ChannelRouter::new();
    let reporter = router.reporter();
    router
        .route(
            outbound::ERROR,
            handler_fn(|payload: Value, _send| async move {
                tracing::error!(%payload, "application core reported an error");
                Ok::<_, HandlerError>(())
            }),
        )
        .route(
            outbound::SET_GRAIN_CACHE,
            cache_writer(cache, &config.grain_cache_key),
        )
        .route(
            outbound::CACHE_GRAIN_LIST,
            cache_writer(cache, &config.grains_key),
        )
        .route(outbound::PUSH_URL, {
            let navigator = Arc::clone(navigator);
            handler_fn(move |payload: Value, send: InboundSender| {
                let navigator = Arc::clone(&navigator);
                async move {
                    let url = parse_url(payload)?;
                    navigator.push_url(&url);
                    send.send(inbound::URL_CHANGED, json!({ "href": url }))?;
                    Ok::<_, HandlerError>(())
                }
            })
        })
        .route(outbound::REPLACE_STATE, {
            let navigator = Arc::clone(navigator);
            handler_fn(move |payload: Value, _send| {
                let navigator = Arc::clone(&navigator);
                async move {
                    let url = parse_url(payload)?;
                    navigator.replace_state(&url);
                    Ok::<_, HandlerError>(())
                }
            })
        })
        .route(outbound::NAVIGATE_BACK, {
            let navigator = Arc::clone(navigator);
            handler_fn(move |_payload, send: InboundSender| {
                let navigator = Arc::clone(&navigator);
                async move {
                    match navigator.back() {
                        Some(url) => send.send(inbound::URL_CHANGED, json!({ "href": url }))?,
                        None => tracing::debug!("navigate back at first history entry"),
                    }
                    Ok::<_, HandlerError>(())
                }
            })
        })
        .route(outbound::SIGN_IN, {
            let session = Arc::clone(session);
            handler_fn(move |_payload, _send| {
                let session = Arc::clone(&session);
                async move {
                    session.sign_in().await.map_err(HandlerError::failed)?;
                    Ok::<_, HandlerError>(())
                }
            })
        })
        .route(outbound::SIGN_OUT, {
            let session = Arc::clone(session);
            handler_fn(move |_payload, _send| {
                let session = Arc::clone(&session);
                async move {
                    session.sign_out().await.map_err(HandlerError::failed)?;
                    Ok::<_, HandlerError>(())
                }
            })
        })
        .route(outbound::PERSIST_SAVED_GRAIN_LIST, {
            let sync = sync.clone();
            handler_fn(move |payload: Value, _send| {
                // The ticket resolves only once the window closes; watch it
                // off the channel task so later payloads keep flowing.
                let scheduled = sync.persist_payload(payload).map(|ticket| {
                    let reporter = reporter.clone();
                    tokio::spawn(async move {
                        match ticket.outcome().await {
                            Err(e @ CommitError::Remote(_)) => {
                                reporter.report(outbound::PERSIST_SAVED_GRAIN_LIST, &e);
                            }
                            Err(CommitError::Discarded(reason)) => {
                                tracing::debug!(%reason, "pending write discarded");
                            }
                            Ok(_) => {}
                        }
                    });
                });
                async move { scheduled.map_err(HandlerError::failed) }
            })
        })
}

fn cache_writer<C>(cache: &Arc<JsonCache<C>>, key: &str) -> impl PortHandler + 'static
where
    C: CacheStore + 'static,
{
    let cache = Arc::clone(cache);
    let key = key.to_string();
    handler_fn(move |payload: Value, _send| {
        let cache = Arc::clone(&cache);
        let key = key.clone();
        async move {
            cache
                .set(&key, &payload)
                .await
                .map_err(HandlerError::failed)?;
            Ok::<_, HandlerError>(())
        }
    })
}
