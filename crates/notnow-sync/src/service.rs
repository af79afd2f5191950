//! Remote sync service: session-scoped change listener and batched write-back.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use notnow_core::{
    BridgeConfig, ChannelSender, CollectionPath, RemoteDocument, SessionObserver, SessionState,
    traits::RemoteStore, types::RecordError,
};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    debounce::{
        BatchWindow, CommitError, CommitTicket, DiscardReason, PendingWrite, WritePhase,
        WriteQueue,
    },
    listener::{ListenerHandle, ListenerId},
};

/// Sync service error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not signed in, remote operation dropped")]
    SignedOut,
    #[error("Expected a list of records")]
    NotAList,
    #[error("Invalid record at index {index}: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: RecordError,
    },
}

/// Sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Per-user collection name.
    pub collection: String,
    /// Quiescence window before a pending snapshot is committed.
    pub debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for SyncSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            debounce: config.debounce(),
        }
    }
}

/// Read-path state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    /// No session; nothing attached.
    Idle,
    /// A listener is attached to the signed-in user's collection.
    Listening {
        uid: String,
        listener: ListenerId,
    },
}

struct ReadState {
    session: SessionState,
    listener: Option<ListenerHandle>,
}

struct Inner<R> {
    store: Arc<R>,
    fire: ChannelSender,
    settings: SyncSettings,
    read: Mutex<ReadState>,
    write: Mutex<WriteQueue>,
}

impl<R> Inner<R> {
    fn read(&self) -> MutexGuard<'_, ReadState> {
        self.read.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> MutexGuard<'_, WriteQueue> {
        self.write.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn path(&self, uid: &str) -> CollectionPath {
        CollectionPath::for_user(uid, &self.settings.collection)
    }
}

/// Keeps the application core and the signed-in user's remote collection in step.
///
/// Follows session transitions as a [`SessionObserver`]: every new identity
/// gets a fresh listener (the previous one is detached first) and signing out
/// detaches it. Writes go through [`persist`](Self::persist), which collapses
/// calls within the debounce window into one atomic batch commit.
pub struct RemoteSyncService<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for RemoteSyncService<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> RemoteSyncService<R>
where
    R: RemoteStore + 'static,
{
    /// Create an idle service sending change batches on `fire`.
    #[must_use]
    pub fn new(store: Arc<R>, fire: ChannelSender, settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                fire,
                settings,
                read: Mutex::new(ReadState {
                    session: SessionState::SignedOut,
                    listener: None,
                }),
                write: Mutex::new(WriteQueue::new()),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Current read-path phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        let read = self.inner.read();
        match (&read.session, &read.listener) {
            (SessionState::SignedIn(identity), Some(listener)) => SyncPhase::Listening {
                uid: identity.uid.clone(),
                listener: listener.id(),
            },
            _ => SyncPhase::Idle,
        }
    }

    /// Current write-path phase.
    #[must_use]
    pub fn write_phase(&self) -> WritePhase {
        self.inner.write().phase()
    }

    /// Schedule a snapshot for the next batch commit.
    ///
    /// Replaces any snapshot pending in the current window.
    ///
    /// # Errors
    /// Returns error if no user is signed in or a record has no string `id`.
    /// Rejected snapshots are never scheduled.
    pub fn persist(&self, records: Vec<Value>) -> Result<CommitTicket, SyncError> {
        let owner = self.inner.read().session.uid().map(ToOwned::to_owned);
        let Some(owner) = owner else {
            tracing::warn!(records = records.len(), "persist while signed out, dropped");
            return Err(SyncError::SignedOut);
        };

        let documents = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                RemoteDocument::from_record(record)
                    .map_err(|source| SyncError::InvalidRecord { index, source })
            })
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| tracing::warn!("persist rejected: {e}"))?;

        let window = BatchWindow::from_snapshot(documents);
        let documents = window.len();
        let deadline = Instant::now() + self.inner.settings.debounce;
        let (ticket, start_timer) = self.inner.write().schedule(&owner, window, deadline);
        if start_timer {
            tokio::spawn(run_timer(Arc::clone(&self.inner)));
        }

        tracing::debug!(uid = %owner, documents, "snapshot scheduled");
        Ok(ticket)
    }

    /// [`persist`](Self::persist) for a raw channel payload holding a JSON list.
    ///
    /// # Errors
    /// Returns error if the payload is not a list, or as `persist`.
    pub fn persist_payload(&self, payload: Value) -> Result<CommitTicket, SyncError> {
        match payload {
            Value::Array(records) => self.persist(records),
            other => {
                tracing::warn!(payload = %other, "persist payload is not a list");
                Err(SyncError::NotAList)
            }
        }
    }

    /// Detach the listener and drop any pending write.
    pub fn shutdown(&self) {
        let listener = self.inner.read().listener.take();
        if let Some(listener) = listener {
            listener.cancel();
        }
        self.inner.write().discard(DiscardReason::Shutdown);
    }
}

impl<R> SessionObserver for RemoteSyncService<R>
where
    R: RemoteStore + 'static,
{
    fn on_transition(&self, state: &SessionState) {
        let mut read = self.inner.read();

        match state {
            SessionState::SignedIn(identity) => {
                let same_user = read.session.uid() == Some(identity.uid.as_str());
                if same_user && read.listener.as_ref().is_some_and(ListenerHandle::is_active) {
                    read.session = state.clone();
                    return;
                }

                if let Some(previous) = read.listener.take() {
                    previous.cancel();
                }
                if !same_user {
                    let mut write = self.inner.write();
                    if write.pending_owner().is_some_and(|owner| owner != identity.uid) {
                        write.discard(DiscardReason::SessionChanged);
                    }
                }

                let path = self.inner.path(&identity.uid);
                let stream = self.inner.store.on_change(&path);
                read.listener = Some(ListenerHandle::spawn(path, stream, self.inner.fire.clone()));
                read.session = state.clone();
                tracing::info!(uid = %identity.uid, "remote sync listening");
            }
            SessionState::SignedOut => {
                if let Some(previous) = read.listener.take() {
                    previous.cancel();
                }
                read.session = SessionState::SignedOut;
                self.inner.write().discard(DiscardReason::SignedOut);
                tracing::info!("remote sync idle");
            }
        }
    }
}

/// Drive the write queue until it drains. One timer runs at a time.
async fn run_timer<R>(inner: Arc<Inner<R>>)
where
    R: RemoteStore,
{
    loop {
        let Some(deadline) = inner.write().next_deadline() else {
            return;
        };
        tokio::time::sleep_until(deadline).await;

        let due = inner.write().take_due(Instant::now());
        if let Some(due) = due {
            commit(&inner, due).await;
        }
    }
}

async fn commit<R>(inner: &Inner<R>, due: PendingWrite)
where
    R: RemoteStore,
{
    let current = inner.read().session.uid().map(ToOwned::to_owned);
    if current.as_deref() != Some(due.owner.as_str()) {
        tracing::warn!(owner = %due.owner, "pending write dropped, session no longer active");
        due.resolve(&Err(CommitError::Discarded(DiscardReason::SessionChanged)));
        return;
    }

    let path = inner.path(&due.owner);
    let documents = due.window.clone().into_documents();
    let count = documents.len();
    let result = inner
        .store
        .commit(&path, documents)
        .await
        .map(|()| count)
        .map_err(CommitError::from);

    match &result {
        Ok(count) => tracing::info!(%path, documents = count, "batch committed"),
        Err(e) => tracing::warn!(%path, "batch commit failed: {e}"),
    }
    due.resolve(&result);
}
