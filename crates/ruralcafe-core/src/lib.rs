//! RuralCafe Core - sessions, credentials, and per-user settings.
//!
//! This crate holds the user-facing state of the remote proxy core: the
//! IP-keyed session map with sliding expiry, the flat-file credential
//! store, and the per-(endpoint, user) settings store that carries the
//! richness tier consumed by the fetch dispatcher.

pub mod richness;
pub mod session;
pub mod settings;
pub mod users;

pub use richness::{InvalidRichness, Richness};
pub use session::{SessionError, SessionManager, SESSION_TIMEOUT};
pub use settings::{SettingsStore, UserSettings};
pub use users::{UserRecord, UserStore, UserStoreError};
