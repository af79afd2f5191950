//! Trailing-edge write debouncing.
//!
//! Provides:
//! - `BatchWindow` - Latest snapshot collapsed by document id
//! - `WriteQueue` - The `Quiescent`/`Pending` timer state machine
//! - `CommitTicket` - Outcome of the window a `persist` call ended up in

use std::collections::BTreeMap;

use notnow_core::{RemoteDocument, traits::RemoteError};
use thiserror::Error;
use tokio::{sync::oneshot, time::Instant};

/// Why a pending window was dropped without a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The session ended before the window fired.
    SignedOut,
    /// A different identity signed in before the window fired.
    SessionChanged,
    /// The sync service shut down.
    Shutdown,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SignedOut => "signed out",
            Self::SessionChanged => "session changed",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Commit error reported to every ticket of a window.
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    #[error("Batch commit failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("Pending write discarded: {0}")]
    Discarded(DiscardReason),
}

/// Number of documents written, or why nothing was.
pub type CommitResult = Result<usize, CommitError>;

/// Handle on the eventual commit of a scheduled snapshot.
///
/// Calls superseded within the same window resolve with that window's outcome.
#[derive(Debug)]
pub struct CommitTicket {
    rx: oneshot::Receiver<CommitResult>,
}

impl CommitTicket {
    /// Wait for the window to be committed or discarded.
    pub async fn outcome(self) -> CommitResult {
        self.rx
            .await
            .unwrap_or(Err(CommitError::Discarded(DiscardReason::Shutdown)))
    }
}

/// Pending documents keyed by id; later entries for an id win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWindow {
    documents: BTreeMap<String, RemoteDocument>,
}

impl BatchWindow {
    /// Collapse a snapshot by document id.
    pub fn from_snapshot<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = RemoteDocument>,
    {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| (doc.id.clone(), doc))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document ids in commit order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<RemoteDocument> {
        self.documents.into_values().collect()
    }
}

/// Timer state of the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Quiescent,
    Pending,
}

/// A window waiting for its deadline.
#[derive(Debug)]
pub struct PendingWrite {
    /// Uid that was signed in when the window was scheduled.
    pub owner: String,
    pub window: BatchWindow,
    pub deadline: Instant,
    waiters: Vec<oneshot::Sender<CommitResult>>,
}

impl PendingWrite {
    /// Deliver the outcome to every ticket of this window.
    pub fn resolve(self, result: &CommitResult) {
        for waiter in self.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// The write path's debounce state machine.
///
/// Holds at most one pending window. Timing is left to the owner: it asks for
/// the [`next_deadline`](Self::next_deadline), sleeps, and then asks for the
/// window if it is [due](Self::take_due).
#[derive(Debug, Default)]
pub struct WriteQueue {
    pending: Option<PendingWrite>,
    timer_running: bool,
}

impl WriteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn phase(&self) -> WritePhase {
        if self.pending.is_some() {
            WritePhase::Pending
        } else {
            WritePhase::Quiescent
        }
    }

    /// Replace the pending window and push its deadline out.
    ///
    /// Returns the new ticket and whether the caller must start a timer.
    pub fn schedule(
        &mut self,
        owner: &str,
        window: BatchWindow,
        deadline: Instant,
    ) -> (CommitTicket, bool) {
        let mut waiters = Vec::new();
        if let Some(previous) = self.pending.take() {
            if previous.owner == owner {
                waiters = previous.waiters;
            } else {
                previous.resolve(&Err(CommitError::Discarded(DiscardReason::SessionChanged)));
            }
        }

        let (tx, rx) = oneshot::channel();
        waiters.push(tx);
        self.pending = Some(PendingWrite {
            owner: owner.to_string(),
            window,
            deadline,
            waiters,
        });

        let start_timer = !self.timer_running;
        self.timer_running = true;
        (CommitTicket { rx }, start_timer)
    }

    /// Deadline the timer should sleep until.
    ///
    /// Returns `None` once nothing is pending, which also marks the timer stopped.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        let deadline = self.pending.as_ref().map(|p| p.deadline);
        if deadline.is_none() {
            self.timer_running = false;
        }
        deadline
    }

    /// Take the pending window if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<PendingWrite> {
        if self.pending.as_ref().is_some_and(|p| p.deadline <= now) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Drop the pending window, if any, resolving its tickets.
    pub fn discard(&mut self, reason: DiscardReason) -> bool {
        self.pending.take().is_some_and(|pending| {
            tracing::debug!(
                owner = %pending.owner,
                documents = pending.window.len(),
                %reason,
                "pending write discarded"
            );
            pending.resolve(&Err(CommitError::Discarded(reason)));
            true
        })
    }

    /// Owner of the pending window, if any.
    #[must_use]
    pub fn pending_owner(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.owner.as_str())
    }
}
