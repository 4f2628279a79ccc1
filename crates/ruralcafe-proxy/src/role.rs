//! Proxy role strategies.
//!
//! The two proxy roles share one capability surface — enqueue a fetch,
//! dequeue by id, resolve per-user settings — selected through a tagged
//! enum rather than a base-class hierarchy. The remote role dispatches
//! through its own queue; the local role relays to the remote proxy over
//! HTTP and keeps only the settings side local.

use std::sync::Arc;

use ruralcafe_core::{InvalidRichness, Richness, SettingsStore, UserSettings};

use crate::error::{ProxyError, Result};
use crate::queue::{DequeueOutcome, FetchRequest, RequestQueue};

/// A proxy role and the capabilities it exposes to the control surface.
#[derive(Clone)]
pub enum ProxyRole {
    /// Internet-connected side: requests dispatch through the local queue.
    Remote {
        queue: Arc<RequestQueue>,
        settings: SettingsStore,
    },

    /// Bandwidth-constrained side: requests relay upstream.
    Local {
        upstream: String,
        client: reqwest::Client,
        settings: SettingsStore,
    },
}

impl ProxyRole {
    /// Creates the remote role over a queue.
    pub fn remote(queue: Arc<RequestQueue>, settings: SettingsStore) -> Self {
        Self::Remote { queue, settings }
    }

    /// Creates the local role relaying to `upstream`
    /// (e.g. `http://remote-proxy:8081`).
    pub fn local(upstream: impl Into<String>, settings: SettingsStore) -> Self {
        Self::Local {
            upstream: upstream.into(),
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn settings(&self) -> &SettingsStore {
        match self {
            Self::Remote { settings, .. } | Self::Local { settings, .. } => settings,
        }
    }

    /// Returns the settings for an (endpoint, user) pair, creating a
    /// default entry if absent.
    pub fn settings_for(&self, endpoint: &str, user_id: u64) -> UserSettings {
        self.settings().get(endpoint, user_id)
    }

    /// Stores a richness value for an (endpoint, user) pair.
    pub fn set_richness(
        &self,
        endpoint: &str,
        user_id: u64,
        value: &str,
    ) -> std::result::Result<Richness, InvalidRichness> {
        self.settings().set_richness(endpoint, user_id, value)
    }

    /// Submits a fetch request, returning its id.
    pub async fn enqueue(&self, request: FetchRequest) -> Result<u64> {
        match self {
            Self::Remote { queue, .. } => Ok(queue.enqueue(request)),
            Self::Local {
                upstream, client, ..
            } => {
                let response = client
                    .post(format!("{upstream}/api/request/add"))
                    .json(&serde_json::json!({ "uri": request.uri }))
                    .send()
                    .await
                    .map_err(|e| ProxyError::Upstream(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ProxyError::Upstream(format!(
                        "add relay answered {}",
                        response.status()
                    )));
                }

                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| ProxyError::Upstream(e.to_string()))?;
                body.get("id")
                    .and_then(|id| id.as_u64())
                    .ok_or_else(|| ProxyError::Upstream("add relay response has no id".to_string()))
            }
        }
    }

    /// Cancels or removes a pending request by id.
    pub async fn dequeue(&self, id: u64) -> Result<DequeueOutcome> {
        match self {
            Self::Remote { queue, .. } => Ok(queue.dequeue(id)),
            Self::Local {
                upstream, client, ..
            } => {
                let response = client
                    .get(format!("{upstream}/api/request/remove"))
                    .query(&[("i", id)])
                    .send()
                    .await
                    .map_err(|e| ProxyError::Upstream(e.to_string()))?;

                if response.status().as_u16() == 404 {
                    return Ok(DequeueOutcome::NotFound);
                }
                if !response.status().is_success() {
                    return Err(ProxyError::Upstream(format!(
                        "remove relay answered {}",
                        response.status()
                    )));
                }

                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| ProxyError::Upstream(e.to_string()))?;
                match body.get("outcome").and_then(|o| o.as_str()) {
                    Some("removed") => Ok(DequeueOutcome::Removed),
                    Some("cancelling") => Ok(DequeueOutcome::Cancelling),
                    _ => Err(ProxyError::Upstream(
                        "remove relay response has no outcome".to_string(),
                    )),
                }
            }
        }
    }
}

impl std::fmt::Debug for ProxyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote { .. } => f.debug_struct("ProxyRole::Remote").finish_non_exhaustive(),
            Self::Local { upstream, .. } => f
                .debug_struct("ProxyRole::Local")
                .field("upstream", upstream)
                .finish_non_exhaustive(),
        }
    }
}
