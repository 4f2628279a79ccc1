//! Fetch dispatcher.
//!
//! A single coordinator task drains the shared queue into a bounded pool
//! of fetch workers. The coordinator is the only component that blocks
//! waiting for work: it suspends on the queue's signal and re-validates
//! both the worker budget and queue non-emptiness on every wake, which
//! guards against spurious wakeups and multi-producer races. Workers run
//! off-loop and re-signal the coordinator when they finish.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use ruralcafe_cache::CacheManager;

use crate::fetch::Fetcher;
use crate::mapper::UriMapper;
use crate::queue::{QueuedRequest, RequestQueue, RequestState};

/// Default worker budget.
pub const DEFAULT_MAX_INFLIGHT: usize = 50;

/// Default deadline for one outbound fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How many requests may be dispatched concurrently.
    pub max_inflight: usize,
    /// Deadline applied to each outbound fetch.
    pub fetch_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    /// Sets the worker budget.
    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.max_inflight = max_inflight;
        self
    }

    /// Sets the per-fetch deadline.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }
}

/// Coordinates queue draining and bounded-concurrency fetching.
pub struct Dispatcher {
    queue: Arc<RequestQueue>,
    fetcher: Arc<dyn Fetcher>,
    mapper: Arc<dyn UriMapper>,
    cache: CacheManager,
    max_inflight: AtomicUsize,
    active: AtomicUsize,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_inflight", &self.max_inflight.load(Ordering::Relaxed))
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the given queue, fetcher, mapper, and
    /// cache.
    pub fn new(
        queue: Arc<RequestQueue>,
        fetcher: Arc<dyn Fetcher>,
        mapper: Arc<dyn UriMapper>,
        cache: CacheManager,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            fetcher,
            mapper,
            cache,
            max_inflight: AtomicUsize::new(config.max_inflight),
            active: AtomicUsize::new(0),
            fetch_timeout: config.fetch_timeout,
        }
    }

    /// Returns the current worker budget.
    pub fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }

    /// Retunes the worker budget at runtime.
    ///
    /// Raising it wakes the coordinator, which may immediately release
    /// additional queued work.
    pub fn set_max_inflight(&self, max_inflight: usize) {
        let old = self.max_inflight.swap(max_inflight, Ordering::SeqCst);
        if old != max_inflight {
            tracing::info!(old, new = max_inflight, "Worker budget changed");
        }
        self.queue.signal();
    }

    /// Returns the number of currently dispatched requests.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the queue this dispatcher drains.
    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    /// Starts the coordinator loop in the background.
    ///
    /// Returns a handle that can be used to stop it.
    pub fn start(self: Arc<Self>) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let dispatcher = Arc::clone(&self);

        let handle = tokio::spawn(async move {
            dispatcher.run(shutdown_rx).await;
        });

        DispatcherHandle {
            shutdown_tx,
            handle,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        tracing::info!(budget = self.max_inflight(), "Dispatcher started");

        loop {
            self.dispatch_eligible();

            tokio::select! {
                _ = self.queue.wait() => {}
                _ = shutdown_rx.recv() => {
                    tracing::info!("Dispatcher shutdown signal received");
                    break;
                }
            }
        }
    }

    /// Pops and starts queued requests while the budget allows.
    ///
    /// Only the coordinator increments the active count, so checking the
    /// budget before each pop keeps concurrent dispatches at or under it.
    fn dispatch_eligible(self: &Arc<Self>) {
        while self.active.load(Ordering::SeqCst) < self.max_inflight.load(Ordering::SeqCst) {
            let Some(entry) = self.queue.pop_eligible() else {
                break;
            };
            self.active.fetch_add(1, Ordering::SeqCst);

            let dispatcher = Arc::clone(self);
            tokio::spawn(async move {
                dispatcher.work(entry).await;
            });
        }
    }

    /// Runs one request to a terminal state and re-signals the
    /// coordinator. A crashed worker is accounted as Failed; it never
    /// takes the coordinator down.
    async fn work(self: Arc<Self>, entry: QueuedRequest) {
        let id = entry.id;

        let inner = tokio::spawn({
            let dispatcher = Arc::clone(&self);
            async move { dispatcher.execute(&entry).await }
        });
        let state = match inner.await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(id, "Worker crashed: {}", e);
                RequestState::Failed
            }
        };

        self.queue.complete(id, state);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.queue.signal();
    }

    /// Fetches one request and writes the body into the cache.
    ///
    /// The cancellation flag is polled before the fetch and again before
    /// the cache write; in-flight network I/O is bounded by the fetch
    /// deadline rather than force-killed.
    async fn execute(&self, entry: &QueuedRequest) -> RequestState {
        let QueuedRequest {
            id,
            request,
            cancelled,
        } = entry;

        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!(id, "Cancelled before fetch");
            return RequestState::Cancelled;
        }

        let body = match self
            .fetcher
            .fetch(&request.uri, request.richness, self.fetch_timeout)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(id, uri = %request.uri, "Fetch failed: {}", e);
                return RequestState::Failed;
            }
        };

        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!(id, "Cancelled after fetch, discarding body");
            return RequestState::Cancelled;
        }

        let path = self.cache.root().join(self.mapper.cache_path(&request.uri));
        if let Err(e) = write_page(&path, &body) {
            tracing::warn!(id, path = ?path, "Cache write failed: {}", e);
            return RequestState::Failed;
        }

        tracing::debug!(id, uri = %request.uri, bytes = body.len(), "Request completed");
        RequestState::Completed
    }
}

fn write_page(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}

/// Handle for controlling a running dispatcher.
pub struct DispatcherHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signals the coordinator to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the coordinator to finish.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Shuts down the coordinator and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}
