//! In-memory remote store.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, RwLock},
};

use async_trait::async_trait;
use futures::StreamExt;
use notnow_core::{
    ChangeType, CollectionPath, DocumentChange, RemoteDocument,
    traits::{ChangeStream, RemoteError, RemoteStore},
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Collection = BTreeMap<String, Map<String, Value>>;
type Subscriber = mpsc::UnboundedSender<Vec<DocumentChange>>;

/// One call to [`RemoteStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub path: CollectionPath,
    pub documents: Vec<RemoteDocument>,
    /// Whether the batch was applied.
    pub applied: bool,
}

/// In-memory remote store implementation.
///
/// Batches apply under one write lock, so readers never see half a batch.
/// Subscribers get the current contents as one `added` batch on attach.
/// Data is lost on restart.
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<CollectionPath, Collection>>,
    subscribers: Mutex<HashMap<CollectionPath, Vec<Subscriber>>>,
    commits: Mutex<Vec<CommitRecord>>,
    failures: Mutex<VecDeque<RemoteError>>,
}

impl MemoryRemoteStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Every commit call so far, including failed ones.
    #[must_use]
    pub fn commits(&self) -> Vec<CommitRecord> {
        lock(&self.commits).clone()
    }

    /// Number of commit calls so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        lock(&self.commits).len()
    }

    /// Current documents of a collection, ordered by id.
    #[must_use]
    pub fn documents(&self, path: &CollectionPath) -> Vec<RemoteDocument> {
        self.collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| RemoteDocument::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make the next commit fail without applying anything.
    pub fn fail_next_commit(&self, error: RemoteError) {
        lock(&self.failures).push_back(error);
    }

    /// Delete a document, notifying subscribers with a `removed` change.
    pub fn delete_document(&self, path: &CollectionPath, id: &str) -> bool {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let removed = collections.get_mut(path).and_then(|c| c.remove(id));
        let Some(data) = removed else {
            return false;
        };
        self.notify(
            path,
            vec![DocumentChange {
                kind: ChangeType::Removed,
                id: id.to_string(),
                data,
            }],
        );
        drop(collections);
        true
    }

    /// Deliver a raw change batch to subscribers without touching contents.
    pub fn inject(&self, path: &CollectionPath, batch: Vec<DocumentChange>) {
        let _collections = self
            .collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.notify(path, batch);
    }

    /// Number of live subscriptions on a collection.
    #[must_use]
    pub fn subscriber_count(&self, path: &CollectionPath) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.get_mut(path).map_or(0, |subs| {
            subs.retain(|tx| !tx.is_closed());
            subs.len()
        })
    }

    fn apply(collection: &mut Collection, document: RemoteDocument) -> DocumentChange {
        let RemoteDocument { id, fields } = document;
        let kind = if collection.insert(id.clone(), fields.clone()).is_some() {
            ChangeType::Modified
        } else {
            ChangeType::Added
        };
        DocumentChange {
            kind,
            id,
            data: fields,
        }
    }

    /// Callers hold the collections lock so notification order matches apply order.
    fn notify(&self, path: &CollectionPath, batch: Vec<DocumentChange>) {
        let mut subscribers = lock(&self.subscribers);
        if let Some(subs) = subscribers.get_mut(path) {
            subs.retain(|tx| tx.send(batch.clone()).is_ok());
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn commit(
        &self,
        path: &CollectionPath,
        documents: Vec<RemoteDocument>,
    ) -> Result<(), RemoteError> {
        let failure = lock(&self.failures).pop_front();
        lock(&self.commits).push(CommitRecord {
            path: path.clone(),
            documents: documents.clone(),
            applied: failure.is_none(),
        });
        if let Some(error) = failure {
            return Err(error);
        }

        let mut collections = self
            .collections
            .write()
            .map_err(|e| RemoteError::Internal(e.to_string()))?;
        let collection = collections.entry(path.clone()).or_default();
        let changes: Vec<DocumentChange> = documents
            .into_iter()
            .map(|doc| Self::apply(collection, doc))
            .collect();
        self.notify(path, changes);
        drop(collections);
        Ok(())
    }

    async fn set_document(
        &self,
        path: &CollectionPath,
        document: RemoteDocument,
    ) -> Result<(), RemoteError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| RemoteError::Internal(e.to_string()))?;
        let change = Self::apply(collections.entry(path.clone()).or_default(), document);
        self.notify(path, vec![change]);
        drop(collections);
        Ok(())
    }

    fn on_change(&self, path: &CollectionPath) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let collections = self
            .collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let initial: Vec<DocumentChange> = collections
            .get(path)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| DocumentChange {
                        kind: ChangeType::Added,
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !initial.is_empty() {
            let _ = tx.send(initial);
        }
        lock(&self.subscribers)
            .entry(path.clone())
            .or_default()
            .push(tx);
        drop(collections);

        UnboundedReceiverStream::new(rx).boxed()
    }
}
