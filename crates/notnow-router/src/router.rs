//! Subscription router from outbound channels to handlers.

use std::{collections::HashMap, fmt, sync::Arc};

use notnow_core::{InboundSender, PortHost};
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::handler::PortHandler;

/// Router error.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Application instance exposes no ports")]
    NoPorts,
}

/// A handler invocation that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Outbound channel the payload arrived on.
    pub channel: String,
    /// Rendered handler error.
    pub error: String,
}

/// Reports failures that surface after a handler has returned.
///
/// Failures land on the same queue as handler errors, so they are read from
/// [`RouterHandle::next_failure`].
#[derive(Debug, Clone)]
pub struct FailureReporter {
    tx: mpsc::UnboundedSender<HandlerFailure>,
}

impl FailureReporter {
    /// Log and queue a failure for `channel`.
    pub fn report(&self, channel: &str, error: &dyn fmt::Display) {
        tracing::warn!(%channel, %error, "port handler failed");
        let _ = self.tx.send(HandlerFailure {
            channel: channel.to_string(),
            error: error.to_string(),
        });
    }
}

/// Mapping from outbound channel names to handlers.
pub struct ChannelRouter {
    routes: HashMap<String, Arc<dyn PortHandler>>,
    reporter: FailureReporter,
    failures: mpsc::UnboundedReceiver<HandlerFailure>,
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRouter {
    #[must_use]
    pub fn new() -> Self {
        let (tx, failures) = mpsc::unbounded_channel();
        Self {
            routes: HashMap::new(),
            reporter: FailureReporter { tx },
            failures,
        }
    }

    /// Reporter feeding this router's failure queue.
    #[must_use]
    pub fn reporter(&self) -> FailureReporter {
        self.reporter.clone()
    }

    /// Bind a handler to an outbound channel, replacing any earlier binding.
    #[must_use]
    pub fn route<H>(mut self, channel: impl Into<String>, handler: H) -> Self
    where
        H: PortHandler + 'static,
    {
        let channel = channel.into();
        if self.routes.insert(channel.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(%channel, "handler replaced");
        }
        self
    }

    /// Number of bound channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Subscribe every routed channel on a live application instance.
    ///
    /// Channels missing on the instance are skipped and reported; the others
    /// are still bound.
    ///
    /// # Errors
    /// Returns error if the instance exposes no ports at all.
    pub fn attach(self, host: &dyn PortHost) -> Result<RouterHandle, RouterError> {
        let Some(ports) = host.ports() else {
            tracing::error!("no ports found on application instance");
            return Err(RouterError::NoPorts);
        };

        let sender = InboundSender::new(Arc::clone(&ports));

        let mut routes: Vec<_> = self.routes.into_iter().collect();
        routes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut bound = Vec::new();
        let mut skipped = Vec::new();
        let mut tasks = Vec::new();

        for (channel, handler) in routes {
            let Some(rx) = ports.subscribe(&channel) else {
                tracing::warn!(%channel, "sub port not found");
                skipped.push(channel);
                continue;
            };
            tasks.push(tokio::spawn(forward(
                channel.clone(),
                rx,
                handler,
                sender.clone(),
                self.reporter.clone(),
            )));
            bound.push(channel);
        }

        tracing::debug!(bound = bound.len(), skipped = skipped.len(), "router attached");

        Ok(RouterHandle {
            bound,
            skipped,
            tasks,
            failures: self.failures,
        })
    }
}

/// Run one channel's handler over its payloads, one at a time.
async fn forward(
    channel: String,
    mut rx: mpsc::UnboundedReceiver<Value>,
    handler: Arc<dyn PortHandler>,
    sender: InboundSender,
    reporter: FailureReporter,
) {
    while let Some(payload) = rx.recv().await {
        tracing::trace!(%channel, "dispatching payload");
        if let Err(e) = handler.handle(payload, sender.clone()).await {
            reporter.report(&channel, &e);
        }
    }
    tracing::debug!(%channel, "outbound port closed");
}

/// Live subscriptions created by [`ChannelRouter::attach`].
///
/// Dropping the handle cancels every subscription.
pub struct RouterHandle {
    bound: Vec<String>,
    skipped: Vec<String>,
    tasks: Vec<JoinHandle<()>>,
    failures: mpsc::UnboundedReceiver<HandlerFailure>,
}

impl RouterHandle {
    /// Channels that were subscribed.
    #[must_use]
    pub fn bound(&self) -> &[String] {
        &self.bound
    }

    /// Channels that were routed but missing on the instance.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Wait for the next handler failure.
    pub async fn next_failure(&mut self) -> Option<HandlerFailure> {
        self.failures.recv().await
    }

    /// Take a handler failure if one is queued.
    pub fn try_next_failure(&mut self) -> Option<HandlerFailure> {
        self.failures.try_recv().ok()
    }

    /// Cancel every subscription.
    pub fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle")
            .field("bound", &self.bound)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
