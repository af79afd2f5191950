//! Realtime listener handles.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use notnow_core::{
    ChangeEvent, ChannelSender, CollectionPath, DocumentChange, FireMsg, traits::ChangeStream,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Listener identifier.
pub type ListenerId = Uuid;

/// An attached realtime subscription.
///
/// Cancellation is synchronous: once [`cancel`](Self::cancel) returns (or the
/// handle is dropped), no further batch from this subscription is delivered.
pub struct ListenerHandle {
    id: ListenerId,
    path: CollectionPath,
    gate: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Forward `stream` to `fire` as `GrainChanges` messages, one per batch.
    #[must_use]
    pub fn spawn(path: CollectionPath, stream: ChangeStream, fire: ChannelSender) -> Self {
        let id = Uuid::new_v4();
        let gate = Arc::new(Mutex::new(true));
        let task = tokio::spawn(forward_changes(
            id,
            path.clone(),
            stream,
            Arc::clone(&gate),
            fire,
        ));
        tracing::debug!(listener = %id, %path, "listener attached");
        Self {
            id,
            path,
            gate,
            task: Some(task),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub const fn path(&self) -> &CollectionPath {
        &self.path
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
            && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Detach the listener.
    pub fn cancel(mut self) {
        self.close();
    }

    fn close(&mut self) {
        *self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = false;
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(listener = %self.id, path = %self.path, "listener cancelled");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn forward_changes(
    id: ListenerId,
    path: CollectionPath,
    mut stream: ChangeStream,
    gate: Arc<Mutex<bool>>,
    fire: ChannelSender,
) {
    while let Some(batch) = stream.next().await {
        if batch.is_empty() {
            tracing::trace!(listener = %id, "empty change batch skipped");
            continue;
        }
        if !deliver(&gate, &fire, batch) {
            break;
        }
    }
    tracing::debug!(listener = %id, %path, "change stream ended");
}

/// Send one batch if the gate is still open. Returns whether it was.
fn deliver(gate: &Mutex<bool>, fire: &ChannelSender, batch: Vec<DocumentChange>) -> bool {
    let changes: Vec<ChangeEvent> = batch.into_iter().map(ChangeEvent::from).collect();

    // The gate stays locked while sending so `close` cannot interleave.
    let open = gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if !*open {
        return false;
    }
    let count = changes.len();
    match fire.send_msg(&FireMsg::GrainChanges { changes }) {
        Ok(()) => tracing::debug!(changes = count, "change batch forwarded"),
        Err(e) => tracing::warn!("failed to forward change batch: {e}"),
    }
    drop(open);
    true
}

#[cfg(test)]
mod tests {
    use notnow_core::{ChangeType, InboundSender, Ports};
    use serde_json::Map;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    fn setup() -> (
        Arc<Ports>,
        mpsc::UnboundedSender<Vec<DocumentChange>>,
        ListenerHandle,
    ) {
        let ports = Arc::new(Ports::new(Vec::<String>::new(), ["fire2Elm"]));
        let fire = InboundSender::new(Arc::clone(&ports)).to("fire2Elm");
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ListenerHandle::spawn(
            CollectionPath::for_user("u", "grains"),
            UnboundedReceiverStream::new(rx).boxed(),
            fire,
        );
        (ports, tx, handle)
    }

    fn added(id: &str) -> DocumentChange {
        DocumentChange {
            kind: ChangeType::Added,
            id: id.into(),
            data: Map::new(),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_empty_batches_are_not_forwarded() {
        let (ports, tx, handle) = setup();
        tx.send(Vec::new()).unwrap();
        tx.send(vec![added("a"), added("b")]).unwrap();
        settle().await;

        let history = ports.inbound_history("fire2Elm");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["payload"]["changes"].as_array().map(Vec::len), Some(2));
        assert!(handle.is_active());
    }

    #[tokio::test]
    async fn test_cancel_stops_queued_batches() {
        let (ports, tx, handle) = setup();
        tx.send(vec![added("queued")]).unwrap();

        handle.cancel();
        settle().await;

        assert!(ports.inbound_history("fire2Elm").is_empty());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_stream_end_deactivates_handle() {
        let (_ports, tx, handle) = setup();
        assert_eq!(handle.path().as_str(), "users/u/grains");
        drop(tx);
        settle().await;
        assert!(!handle.is_active());
    }
}
