//! Flat-file credential store.
//!
//! One record per line, tab-separated: `id \t username \t password`. Ids
//! are sequential integers starting at 1. The whole store is read on every
//! query and rewritten in full on every signup.
//!
//! Passwords are stored in plain text and there is no cross-process
//! locking, so concurrent writers can corrupt the file. Both are legacy
//! behavior of the deployed record format, kept for compatibility with
//! existing stores; do not point this at a file shared with other writers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum UserStoreError {
    /// The username already has a record.
    #[error("username already taken: {0}")]
    UsernameTaken(String),

    /// Username or password contains a tab or newline.
    #[error("username and password must not contain tabs or newlines")]
    ReservedCharacters,

    /// Failed to write the store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for credential store operations.
pub type Result<T> = std::result::Result<T, UserStoreError>;

/// One stored user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Sequential id, starting at 1.
    pub id: u64,
    pub username: String,
    pub password: String,
}

/// Flat-file store of user credentials.
#[derive(Debug, Clone)]
pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    /// Creates a store backed by the given file. The file is not created
    /// until the first signup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record. A missing or unreadable file reads as an empty
    /// store; malformed lines are skipped.
    fn load(&self) -> Vec<UserRecord> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = ?self.path, "Failed to read user store: {}", e);
                return Vec::new();
            }
        };

        contents
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut fields = line.splitn(3, '\t');
                let id = fields.next()?.parse().ok()?;
                let username = fields.next()?.to_string();
                let password = fields.next()?.to_string();
                Some(UserRecord {
                    id,
                    username,
                    password,
                })
            })
            .collect()
    }

    /// Rewrites the whole store.
    fn save(&self, records: &[UserRecord]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut contents = String::new();
        for record in records {
            contents.push_str(&format!(
                "{}\t{}\t{}\n",
                record.id, record.username, record.password
            ));
        }
        fs::write(&self.path, contents)
    }

    /// Looks up a user's id by username.
    pub fn id_of(&self, username: &str) -> Option<u64> {
        self.load()
            .into_iter()
            .find(|record| record.username == username)
            .map(|record| record.id)
    }

    /// Checks a password. Unknown usernames report `false`.
    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.load()
            .iter()
            .any(|record| record.username == username && record.password == password)
    }

    /// Registers a new user and returns the assigned id.
    ///
    /// The id is the next sequential integer; the whole store is rewritten.
    pub fn sign_up(&self, username: &str, password: &str) -> Result<u64> {
        if username.contains(['\t', '\n']) || password.contains(['\t', '\n']) {
            return Err(UserStoreError::ReservedCharacters);
        }

        let mut records = self.load();
        if records.iter().any(|record| record.username == username) {
            return Err(UserStoreError::UsernameTaken(username.to_string()));
        }

        let id = records.len() as u64 + 1;
        records.push(UserRecord {
            id,
            username: username.to_string(),
            password: password.to_string(),
        });
        self.save(&records)?;

        tracing::info!(username, id, "User registered");
        Ok(id)
    }

    /// Returns the number of stored records.
    pub fn count(&self) -> usize {
        self.load().len()
    }
}
