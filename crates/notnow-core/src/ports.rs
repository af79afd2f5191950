//! Named message channels between the application core and the bridge.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, RwLock},
};

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;

/// Default number of messages kept per inbound channel.
pub const INBOUND_HISTORY: usize = 1024;

const BROADCAST_CAPACITY: usize = 10_000;

/// Port error.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Inbound port not found: {0}")]
    UnknownInbound(String),
    #[error("Outbound port not found: {0}")]
    UnknownOutbound(String),
    #[error("No subscriber on outbound port: {0}")]
    NoSubscriber(String),
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound port: owned by the application core, observed by one subscriber.
#[derive(Default)]
struct OutboundPort {
    subscriber: Mutex<Option<mpsc::UnboundedSender<Value>>>,
}

struct InboundInner {
    history: VecDeque<Value>,
}

/// Inbound port: owned by the bridge, observed by the application core.
struct InboundPort {
    inner: RwLock<InboundInner>,
    sender: broadcast::Sender<Value>,
}

impl InboundPort {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: RwLock::new(InboundInner {
                history: VecDeque::with_capacity(32),
            }),
            sender,
        }
    }
}

/// The channel set of one application-core instance.
pub struct Ports {
    outbound: HashMap<String, OutboundPort>,
    inbound: HashMap<String, InboundPort>,
    history_limit: usize,
}

impl Ports {
    /// Create a port set with the given outbound and inbound channel names.
    #[must_use]
    pub fn new<O, I>(outbound: O, inbound: I) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            outbound: outbound
                .into_iter()
                .map(|name| (name.into(), OutboundPort::default()))
                .collect(),
            inbound: inbound
                .into_iter()
                .map(|name| (name.into(), InboundPort::new()))
                .collect(),
            history_limit: INBOUND_HISTORY,
        }
    }

    /// Limit the number of messages retained per inbound channel.
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    #[must_use]
    pub fn has_outbound(&self, name: &str) -> bool {
        self.outbound.contains_key(name)
    }

    #[must_use]
    pub fn has_inbound(&self, name: &str) -> bool {
        self.inbound.contains_key(name)
    }

    /// Subscribe to an outbound channel.
    ///
    /// Replaces any previous subscriber, whose receiver then closes.
    /// Returns `None` if the channel does not exist.
    #[must_use]
    pub fn subscribe(&self, name: &str) -> Option<mpsc::UnboundedReceiver<Value>> {
        let port = self.outbound.get(name)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = port
            .subscriber
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.replace(tx).is_some() {
            tracing::debug!(channel = name, "replaced outbound subscriber");
        }
        Some(rx)
    }

    /// Emit a payload on an outbound channel (application-core side).
    ///
    /// # Errors
    /// Returns error if the channel does not exist or nobody subscribed.
    pub fn emit(&self, name: &str, payload: Value) -> Result<(), PortError> {
        let Some(port) = self.outbound.get(name) else {
            tracing::warn!(channel = name, "outbound port not found, data ignored");
            return Err(PortError::UnknownOutbound(name.to_string()));
        };
        let slot = port
            .subscriber
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let delivered = slot.as_ref().is_some_and(|tx| tx.send(payload).is_ok());
        if delivered {
            Ok(())
        } else {
            tracing::warn!(channel = name, "no handler on outbound port, data ignored");
            Err(PortError::NoSubscriber(name.to_string()))
        }
    }

    /// Send a payload on an inbound channel (bridge side).
    ///
    /// # Errors
    /// Returns error if the channel does not exist.
    pub fn send(&self, name: &str, payload: Value) -> Result<(), PortError> {
        let Some(port) = self.inbound.get(name) else {
            tracing::error!(channel = name, %payload, "inbound port not found, data ignored");
            return Err(PortError::UnknownInbound(name.to_string()));
        };

        // Hold the history lock while broadcasting so history and live order agree.
        let mut inner = port
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = port.sender.send(payload.clone()); // live listeners
        while inner.history.len() >= self.history_limit.max(1) {
            inner.history.pop_front();
        }
        inner.history.push_back(payload);
        Ok(())
    }

    /// Get a receiver for live messages on an inbound channel.
    #[must_use]
    pub fn inbound_receiver(&self, name: &str) -> Option<broadcast::Receiver<Value>> {
        self.inbound.get(name).map(|port| port.sender.subscribe())
    }

    /// Snapshot of the retained messages on an inbound channel.
    #[must_use]
    pub fn inbound_history(&self, name: &str) -> Vec<Value> {
        self.inbound.get(name).map_or_else(Vec::new, |port| {
            port.inner
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .history
                .iter()
                .cloned()
                .collect()
        })
    }

    /// Stream that yields retained history first, then live messages.
    #[must_use]
    pub fn inbound_stream(&self, name: &str) -> Option<futures::stream::BoxStream<'static, Value>> {
        let port = self.inbound.get(name)?;
        let (history, rx) = {
            let inner = port
                .inner
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            (inner.history.clone(), port.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            if let Err(e) = &res {
                tracing::warn!("inbound observer lagged: {e}");
            }
            res.ok()
        });

        Some(Box::pin(hist.chain(live)))
    }
}

/// Handle the bridge uses to send on inbound channels.
#[derive(Clone)]
pub struct InboundSender {
    ports: Arc<Ports>,
}

impl InboundSender {
    #[must_use]
    pub const fn new(ports: Arc<Ports>) -> Self {
        Self { ports }
    }

    /// Send a raw payload on an inbound channel.
    ///
    /// # Errors
    /// Returns error if the channel does not exist.
    pub fn send(&self, channel: &str, payload: Value) -> Result<(), PortError> {
        self.ports.send(channel, payload)
    }

    /// Serialize and send a typed message on an inbound channel.
    ///
    /// # Errors
    /// Returns error if encoding fails or the channel does not exist.
    pub fn send_msg<T: Serialize>(&self, channel: &str, msg: &T) -> Result<(), PortError> {
        let payload = serde_json::to_value(msg)?;
        self.ports.send(channel, payload)
    }

    /// Bind this sender to one channel.
    #[must_use]
    pub fn to(&self, channel: impl Into<String>) -> ChannelSender {
        ChannelSender {
            sender: self.clone(),
            channel: channel.into(),
        }
    }
}

/// An [`InboundSender`] fixed to a single channel.
#[derive(Clone)]
pub struct ChannelSender {
    sender: InboundSender,
    channel: String,
}

impl ChannelSender {
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Serialize and send a typed message.
    ///
    /// # Errors
    /// Returns error if encoding fails or the channel does not exist.
    pub fn send_msg<T: Serialize>(&self, msg: &T) -> Result<(), PortError> {
        self.sender.send_msg(&self.channel, msg)
    }
}

/// Capability of an application-core instance to expose its ports.
pub trait PortHost: Send + Sync {
    /// The instance's port set, or `None` if it was built without channels.
    fn ports(&self) -> Option<Arc<Ports>>;
}

/// A running application-core instance as seen by the bridge.
#[derive(Clone)]
pub struct AppInstance {
    ports: Option<Arc<Ports>>,
}

impl AppInstance {
    #[must_use]
    pub const fn new(ports: Arc<Ports>) -> Self {
        Self { ports: Some(ports) }
    }

    /// An instance that exposes no channels at all.
    #[must_use]
    pub const fn without_ports() -> Self {
        Self { ports: None }
    }
}

impl PortHost for AppInstance {
    fn ports(&self) -> Option<Arc<Ports>> {
        self.ports.clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn ports() -> Ports {
        Ports::new(["save"], ["events"])
    }

    #[test]
    fn test_capabilities() {
        let ports = ports();
        assert!(ports.has_outbound("save"));
        assert!(!ports.has_outbound("events"));
        assert!(ports.has_inbound("events"));
        assert!(!ports.has_inbound("save"));
    }

    #[tokio::test]
    async fn test_emit_preserves_order() {
        let ports = ports();
        let mut rx = ports.subscribe("save").unwrap();
        for i in 0..5 {
            assert_ok!(ports.emit("save", json!(i)));
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await, Some(json!(i)));
        }
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous_subscriber() {
        let ports = ports();
        let mut first = ports.subscribe("save").unwrap();
        let mut second = ports.subscribe("save").unwrap();

        assert_ok!(ports.emit("save", json!("x")));
        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, Some(json!("x")));
    }

    #[test]
    fn test_emit_without_subscriber_is_reported() {
        let ports = ports();
        let err = assert_err!(ports.emit("save", json!(1)));
        assert!(matches!(err, PortError::NoSubscriber(name) if name == "save"));
        assert!(ports.subscribe("missing").is_none());
    }

    #[test]
    fn test_send_to_unknown_inbound_is_dropped() {
        let ports = ports();
        let err = assert_err!(ports.send("nope", json!({})));
        assert!(matches!(err, PortError::UnknownInbound(name) if name == "nope"));
        assert!(ports.inbound_history("nope").is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let ports = ports().with_history_limit(2);
        for i in 0..4 {
            assert_ok!(ports.send("events", json!(i)));
        }
        assert_eq!(ports.inbound_history("events"), vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_inbound_stream_replays_then_follows() {
        let ports = Arc::new(ports());
        let sender = InboundSender::new(Arc::clone(&ports));
        assert_ok!(sender.send("events", json!("old")));

        let mut stream = ports.inbound_stream("events").unwrap();
        assert_ok!(sender.to("events").send_msg(&json!("new")));

        assert_eq!(stream.next().await, Some(json!("old")));
        assert_eq!(stream.next().await, Some(json!("new")));
    }

    #[test]
    fn test_instance_without_ports() {
        assert!(AppInstance::without_ports().ports().is_none());
        assert!(AppInstance::new(Arc::new(ports())).ports().is_some());
    }
}
