//! Shared request queue.
//!
//! A FIFO of pending fetch requests shared by every connection handler and
//! drained by the dispatcher. Insertion order is dispatch order; richness
//! never reorders. Ids are unique among currently queued and dispatched
//! requests.
//!
//! Cancellation is cooperative: removing a still-queued request is
//! immediate and complete, while a dispatched request only gets its flag
//! set and stops when the worker next polls it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use ruralcafe_core::Richness;

/// A fetch request as submitted by a local proxy on behalf of a user.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// The requesting local-proxy endpoint.
    pub endpoint: String,
    /// The authenticated user the request belongs to.
    pub user_id: u64,
    /// Target page URI.
    pub uri: String,
    /// How much of the page to fetch.
    pub richness: Richness,
}

/// Lifecycle of a request.
///
/// Queued → Dispatched → {Completed, Failed, Cancelled}. Queued →
/// Cancelled is always legal; Dispatched → Cancelled only takes effect if
/// the worker observes the flag before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Dispatched,
    Completed,
    Failed,
    Cancelled,
}

/// What `dequeue` did for a given id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// The request was still queued and has been removed.
    Removed,
    /// The request was already dispatched; its cancellation flag is set
    /// and the running worker stops at its next poll point.
    Cancelling,
    /// No queued or dispatched request has this id.
    NotFound,
}

/// A queued request together with its cancellation flag, as handed to the
/// dispatcher.
#[derive(Debug)]
pub struct QueuedRequest {
    pub id: u64,
    pub request: FetchRequest,
    pub cancelled: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct QueueInner {
    queued: VecDeque<QueuedRequest>,
    /// Cancellation flags of dispatched requests, by id.
    dispatched: HashMap<u64, Arc<AtomicBool>>,
}

/// Counts of requests that reached a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub dispatched: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Shared FIFO of pending fetch requests.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    next_id: AtomicU64,
    notify: Notify,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl RequestQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Appends a request to the queue and signals the dispatcher.
    ///
    /// Returns the assigned id. Never blocks the caller on dispatch.
    pub fn enqueue(&self, request: FetchRequest) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut inner = self.inner.lock();
            inner.queued.push_back(QueuedRequest {
                id,
                request,
                cancelled: Arc::new(AtomicBool::new(false)),
            });
        }
        tracing::debug!(id, "Request enqueued");
        self.notify.notify_one();
        id
    }

    /// Removes a queued request or flags a dispatched one for
    /// cancellation. Unknown ids report [`DequeueOutcome::NotFound`].
    pub fn dequeue(&self, id: u64) -> DequeueOutcome {
        let mut inner = self.inner.lock();

        if let Some(pos) = inner.queued.iter().position(|entry| entry.id == id) {
            let entry = inner.queued.remove(pos).expect("position is in bounds");
            entry.cancelled.store(true, Ordering::SeqCst);
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(id, "Queued request removed");
            return DequeueOutcome::Removed;
        }

        if let Some(flag) = inner.dispatched.get(&id) {
            flag.store(true, Ordering::SeqCst);
            tracing::debug!(id, "Dispatched request flagged for cancellation");
            return DequeueOutcome::Cancelling;
        }

        DequeueOutcome::NotFound
    }

    /// Pops the oldest queued request and records it as dispatched.
    /// Called only by the dispatcher.
    pub(crate) fn pop_eligible(&self) -> Option<QueuedRequest> {
        let mut inner = self.inner.lock();
        let entry = inner.queued.pop_front()?;
        inner.dispatched.insert(entry.id, Arc::clone(&entry.cancelled));
        Some(entry)
    }

    /// Records a dispatched request's terminal state and drops it.
    pub(crate) fn complete(&self, id: u64, state: RequestState) {
        {
            let mut inner = self.inner.lock();
            inner.dispatched.remove(&id);
        }
        let counter = match state {
            RequestState::Completed => &self.completed,
            RequestState::Cancelled => &self.cancelled,
            // Anything non-terminal is a dispatcher bug; account it as a
            // failure rather than losing the request.
            RequestState::Failed | RequestState::Queued | RequestState::Dispatched => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Wakes the dispatcher for a re-check of its dispatch condition.
    pub(crate) fn signal(&self) {
        self.notify.notify_one();
    }

    /// Suspends until the next signal. A signal sent while nobody waits is
    /// kept, so enqueues between checks are never lost.
    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Returns the number of queued (not yet dispatched) requests.
    pub fn queued_len(&self) -> usize {
        self.inner.lock().queued.len()
    }

    /// Returns the number of currently dispatched requests.
    pub fn dispatched_len(&self) -> usize {
        self.inner.lock().dispatched.len()
    }

    /// Returns a snapshot of queue counters.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            queued: inner.queued.len(),
            dispatched: inner.dispatched.len(),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
