//! Per-user settings store.
//!
//! Settings are keyed by (local-proxy endpoint, user id). An entry is
//! created lazily with defaults on first lookup and lives for the process
//! lifetime. Concurrent writers to the same entry are last-write-wins; the
//! outer map is the only lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::richness::{InvalidRichness, Richness};

/// Preferences for one (endpoint, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserSettings {
    /// How much content to fetch per page for this user.
    pub richness: Richness,
}

/// Settings for all users, keyed by endpoint then user id.
///
/// Cloning shares the underlying map.
#[derive(Debug, Default)]
pub struct SettingsStore {
    entries: Arc<RwLock<HashMap<String, HashMap<u64, UserSettings>>>>,
    default_richness: Richness,
}

impl SettingsStore {
    /// Creates an empty store with the compiled-in default richness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the richness new entries are created with.
    pub fn with_default_richness(mut self, richness: Richness) -> Self {
        self.default_richness = richness;
        self
    }

    /// Returns the settings for an (endpoint, user) pair, creating a
    /// default-valued entry if absent.
    pub fn get(&self, endpoint: &str, user_id: u64) -> UserSettings {
        let mut entries = self.entries.write().unwrap();
        *entries
            .entry(endpoint.to_string())
            .or_default()
            .entry(user_id)
            .or_insert(UserSettings {
                richness: self.default_richness,
            })
    }

    /// Parses and stores a richness value for an (endpoint, user) pair.
    ///
    /// The value is matched case-insensitively against the known tiers; on
    /// mismatch the entry is left untouched.
    pub fn set_richness(
        &self,
        endpoint: &str,
        user_id: u64,
        value: &str,
    ) -> Result<Richness, InvalidRichness> {
        let richness = Richness::parse(value)?;

        let mut entries = self.entries.write().unwrap();
        entries
            .entry(endpoint.to_string())
            .or_default()
            .entry(user_id)
            .or_insert(UserSettings {
                richness: self.default_richness,
            })
            .richness = richness;

        tracing::debug!(endpoint, user_id, %richness, "Richness updated");
        Ok(richness)
    }

    /// Returns the richness for an (endpoint, user) pair, creating the
    /// entry if absent.
    pub fn richness_for(&self, endpoint: &str, user_id: u64) -> Richness {
        self.get(endpoint, user_id).richness
    }

    /// Returns the number of stored entries across all endpoints.
    pub fn entry_count(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.values().map(|users| users.len()).sum()
    }
}

impl Clone for SettingsStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            default_richness: self.default_richness,
        }
    }
}
