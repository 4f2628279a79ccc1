//! Application state for the control API.

use std::sync::Arc;

use ruralcafe_cache::CacheManager;
use ruralcafe_core::{SessionManager, SettingsStore, UserStore};
use ruralcafe_proxy::{Dispatcher, ProxyRole};

/// Shared application state.
///
/// The session map, the settings map, and the request queue each carry
/// their own synchronization; no operation spans more than one of them
/// transactionally.
#[derive(Clone)]
pub struct AppState {
    /// IP-keyed sessions.
    pub sessions: SessionManager,
    /// Credential store.
    pub users: Arc<UserStore>,
    /// Role strategy carrying the queue (remote) or the upstream relay
    /// (local), plus the settings capability.
    pub role: ProxyRole,
    /// Cache root for packaging and status.
    pub cache: CacheManager,
    /// The dispatcher, when this process runs the remote role.
    pub dispatcher: Option<Arc<Dispatcher>>,
}

impl AppState {
    /// Creates state for a remote-role process.
    pub fn remote(
        sessions: SessionManager,
        users: Arc<UserStore>,
        role: ProxyRole,
        cache: CacheManager,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            sessions,
            users,
            role,
            cache,
            dispatcher: Some(dispatcher),
        }
    }

    /// Creates state for a local-role process, which has no dispatcher of
    /// its own.
    pub fn local(
        sessions: SessionManager,
        users: Arc<UserStore>,
        role: ProxyRole,
        cache: CacheManager,
    ) -> Self {
        Self {
            sessions,
            users,
            role,
            cache,
            dispatcher: None,
        }
    }

    /// Returns the settings store carried by the role.
    pub fn settings(&self) -> SettingsStore {
        match &self.role {
            ProxyRole::Remote { settings, .. } | ProxyRole::Local { settings, .. } => {
                settings.clone()
            }
        }
    }
}
