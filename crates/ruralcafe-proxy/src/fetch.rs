//! Outbound page fetching.
//!
//! The dispatcher reaches origin servers through the [`Fetcher`] seam so
//! tests can script fetch behavior. The production implementation is a
//! shared `reqwest` client with a per-request deadline.

use std::time::Duration;

use async_trait::async_trait;

use ruralcafe_core::Richness;

use crate::error::{ProxyError, Result};

/// Fetches one page body from an origin server.
///
/// The richness tier is threaded through so fetch policies can decide how
/// much of a page to pull; expanding a page into its embedded objects is
/// the crawler collaborator's job, not this seam's.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, uri: &str, richness: Richness, deadline: Duration) -> Result<Vec<u8>>;
}

/// HTTP fetcher over a shared client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher over an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, uri: &str, richness: Richness, deadline: Duration) -> Result<Vec<u8>> {
        tracing::debug!(uri, %richness, "Fetching page");

        let response = self
            .client
            .get(uri)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout(deadline)
                } else {
                    ProxyError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProxyError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Network(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
