//! Session tracking.
//!
//! Maps a client IP to the logged-in user with a sliding inactivity window.
//!
//! ## Invariant
//!
//! The mapping is a bijection at every instant: one IP maps to at most one
//! user, and one user is mapped from at most one IP. `log_in` enforces this
//! by evicting any prior mapping for either side.
//!
//! ## Expiry
//!
//! Expiry is evaluated lazily on `user_id_for`; there is no background
//! sweep, so an idle session lingers in memory until the next query for its
//! IP. That bounded staleness is accepted.
//!
//! ## Usage
//!
//! ```
//! use ruralcafe_core::session::SessionManager;
//!
//! let sessions = SessionManager::new();
//! let ip = "10.0.0.1".parse().unwrap();
//!
//! sessions.log_in(ip, 3);
//! assert_eq!(sessions.user_id_for(ip), Some(3));
//!
//! sessions.log_out(3);
//! assert_eq!(sessions.user_id_for(ip), None);
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Inactivity window after which a session expires (20 minutes).
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(1200);

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The user has no live session.
    #[error("user {0} is not logged in")]
    NotLoggedIn(u64),
}

/// A logged-in user as seen from one client IP.
#[derive(Debug, Clone)]
struct LoggedInUser {
    user_id: u64,
    last_activity: Instant,
}

impl LoggedInUser {
    fn new(user_id: u64) -> Self {
        Self {
            user_id,
            last_activity: Instant::now(),
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// IP-keyed session map with sliding expiry.
///
/// Cloning shares the underlying map.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<IpAddr, LoggedInUser>>>,
    timeout: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Creates a session manager with the standard inactivity window.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout: SESSION_TIMEOUT,
        }
    }

    /// Sets the inactivity window. Intended for tests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Logs a user in from an IP.
    ///
    /// Evicts any existing mapping for the user (from any IP) and any
    /// existing mapping for the IP, keeping the map bijective.
    pub fn log_in(&self, ip: IpAddr, user_id: u64) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|_, entry| entry.user_id != user_id);
        sessions.insert(ip, LoggedInUser::new(user_id));
        tracing::info!(%ip, user_id, "User logged in");
    }

    /// Logs a user out, removing every IP mapped to them (normally one).
    pub fn log_out(&self, user_id: u64) {
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.user_id != user_id);
        if sessions.len() < before {
            tracing::info!(user_id, "User logged out");
        }
    }

    /// Refreshes the last-activity timestamp for an IP, if mapped.
    pub fn touch(&self, ip: IpAddr) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(entry) = sessions.get_mut(&ip) {
            entry.touch();
        }
    }

    /// Resolves the user logged in from an IP.
    ///
    /// Returns `None` for unmapped IPs. A mapped but expired session is
    /// removed (implicit logout) and also reports `None`.
    pub fn user_id_for(&self, ip: IpAddr) -> Option<u64> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get(&ip) {
            Some(entry) if entry.is_expired(self.timeout) => {
                let user_id = entry.user_id;
                sessions.remove(&ip);
                tracing::debug!(%ip, user_id, "Session expired");
                None
            }
            Some(entry) => Some(entry.user_id),
            None => None,
        }
    }

    /// Returns when the user's session will expire absent further activity.
    pub fn expiry_of(&self, user_id: u64) -> Result<Instant, SessionError> {
        let sessions = self.sessions.read().unwrap();
        sessions
            .values()
            .find(|entry| entry.user_id == user_id && !entry.is_expired(self.timeout))
            .map(|entry| entry.last_activity + self.timeout)
            .ok_or(SessionError::NotLoggedIn(user_id))
    }

    /// Returns the number of non-expired sessions.
    pub fn active_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions
            .values()
            .filter(|entry| !entry.is_expired(self.timeout))
            .count()
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    // ==================== Bijection Tests ====================

    #[test]
    fn login_maps_ip_to_user() {
        let sessions = SessionManager::new();
        sessions.log_in(ip(1), 42);
        assert_eq!(sessions.user_id_for(ip(1)), Some(42));
    }

    #[test]
    fn relogin_from_new_ip_evicts_old_ip() {
        let sessions = SessionManager::new();
        sessions.log_in(ip(1), 42);
        sessions.log_in(ip(2), 42);

        assert_eq!(sessions.user_id_for(ip(1)), None);
        assert_eq!(sessions.user_id_for(ip(2)), Some(42));
        assert_eq!(sessions.active_count(), 1);
    }

    #[test]
    fn new_user_on_same_ip_evicts_old_user() {
        let sessions = SessionManager::new();
        sessions.log_in(ip(1), 42);
        sessions.log_in(ip(1), 43);

        assert_eq!(sessions.user_id_for(ip(1)), Some(43));
        assert!(sessions.expiry_of(42).is_err());
        assert_eq!(sessions.active_count(), 1);
    }

    #[test]
    fn mapping_stays_bijective_under_arbitrary_logins() {
        let sessions = SessionManager::new();
        for (client, user) in [(1, 10), (2, 11), (1, 11), (3, 10), (2, 12), (3, 12)] {
            sessions.log_in(ip(client), user);

            // No two IPs may resolve to the same user.
            let mut seen = std::collections::HashSet::new();
            for last in 1..=3 {
                if let Some(id) = sessions.user_id_for(ip(last)) {
                    assert!(seen.insert(id));
                }
            }
        }
    }

    // ==================== Logout Tests ====================

    #[test]
    fn logout_removes_mapping() {
        let sessions = SessionManager::new();
        sessions.log_in(ip(1), 42);
        sessions.log_out(42);

        assert_eq!(sessions.user_id_for(ip(1)), None);
        assert_eq!(sessions.active_count(), 0);
    }

    #[test]
    fn logout_of_unknown_user_is_noop() {
        let sessions = SessionManager::new();
        sessions.log_in(ip(1), 42);
        sessions.log_out(99);
        assert_eq!(sessions.user_id_for(ip(1)), Some(42));
    }

    // ==================== Expiry Tests ====================

    #[test]
    fn expired_session_reports_none_and_is_removed() {
        let sessions = SessionManager::new().with_timeout(Duration::from_millis(10));
        sessions.log_in(ip(1), 42);

        thread::sleep(Duration::from_millis(25));

        assert_eq!(sessions.user_id_for(ip(1)), None);
        // Implicit logout: expiry_of now fails too.
        assert!(matches!(
            sessions.expiry_of(42),
            Err(SessionError::NotLoggedIn(42))
        ));
    }

    #[test]
    fn touch_extends_the_window() {
        let sessions = SessionManager::new().with_timeout(Duration::from_millis(40));
        sessions.log_in(ip(1), 42);

        thread::sleep(Duration::from_millis(25));
        sessions.touch(ip(1));
        thread::sleep(Duration::from_millis(25));

        assert_eq!(sessions.user_id_for(ip(1)), Some(42));
    }

    #[test]
    fn touch_of_unmapped_ip_is_noop() {
        let sessions = SessionManager::new();
        sessions.touch(ip(9));
        assert_eq!(sessions.active_count(), 0);
    }

    #[test]
    fn expiry_of_reports_last_activity_plus_timeout() {
        let sessions = SessionManager::new();
        let before = Instant::now();
        sessions.log_in(ip(1), 42);

        let expiry = sessions.expiry_of(42).unwrap();
        assert!(expiry >= before + SESSION_TIMEOUT);
        assert!(expiry <= Instant::now() + SESSION_TIMEOUT);
    }

    #[test]
    fn expiry_of_unknown_user_fails() {
        let sessions = SessionManager::new();
        assert!(matches!(
            sessions.expiry_of(7),
            Err(SessionError::NotLoggedIn(7))
        ));
    }

    // ==================== Sharing Tests ====================

    #[test]
    fn clone_shares_state() {
        let sessions = SessionManager::new();
        let other = sessions.clone();

        sessions.log_in(ip(1), 42);
        assert_eq!(other.user_id_for(ip(1)), Some(42));
    }

    #[test]
    fn concurrent_logins_keep_one_mapping_per_user() {
        let sessions = SessionManager::new();

        let handles: Vec<_> = (0..10u8)
            .map(|i| {
                let sessions = sessions.clone();
                thread::spawn(move || sessions.log_in(ip(i), 42))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sessions.active_count(), 1);
    }
}
