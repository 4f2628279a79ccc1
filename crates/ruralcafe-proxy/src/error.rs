//! Error types for the proxy.

use std::time::Duration;

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Network-level fetch failure.
    #[error("network error: {0}")]
    Network(String),

    /// Origin answered with a non-success status.
    #[error("unexpected status: {0}")]
    Status(u16),

    /// The fetch deadline elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A relayed request failed at the upstream proxy.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
