//! RuralCafe Proxy - request queue, dispatcher, and fetch workers.
//!
//! This crate is the coordination core of the remote proxy: a shared FIFO
//! of pending fetch requests, a single coordinator that drains it into a
//! bounded pool of workers, and cooperative cancellation of work already
//! in flight.
//!
//! ## Architecture
//!
//! ```text
//! Control Request → RequestQueue.enqueue ──signal──▶ Dispatcher
//!                                                        │ active < budget?
//!                                                        ▼
//!                                                  spawn Worker
//!                                                        │ Fetcher (deadline)
//!                                                        ▼
//!                                                  Cache root write
//!                                                        │
//!                                       terminal state ──┴──re-signal──▶
//! ```
//!
//! Cancellation is cooperative: a queued request is removed outright; a
//! dispatched one has a flag set that its worker polls before and after
//! the fetch. In-flight network I/O is bounded by the fetch deadline, not
//! force-killed.

mod dispatcher;
mod error;
mod fetch;
mod mapper;
mod queue;
mod role;

pub use dispatcher::{
    Dispatcher, DispatcherConfig, DispatcherHandle, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_INFLIGHT,
};
pub use error::{ProxyError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use mapper::{FlatUriMapper, UriMapper};
pub use queue::{DequeueOutcome, FetchRequest, QueueStats, RequestQueue, RequestState};
pub use role::ProxyRole;
