//! Durable storage for the session token and cached user record.
//!
//! The token and the user are always written and removed together. Data that
//! can't be read back is reported as absent so the user simply signs in again.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::UserRecord;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Session file permissions: owner read/write only
#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

/// Keychain service name
const SERVICE_NAME: &str = "sessiongate";

/// Keychain account holding the serialized session
const KEYRING_ACCOUNT: &str = "session";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// The persisted token/user pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub token: String,
    pub user: UserRecord,
}

impl StoredSession {
    pub fn new(token: impl Into<String>, user: UserRecord) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }
}

/// On-disk shape: the two logical entries plus when they were written.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    auth_token: String,
    user: UserRecord,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

impl SessionDocument {
    fn from_session(session: &StoredSession) -> Self {
        Self {
            auth_token: session.token.clone(),
            user: session.user.clone(),
            saved_at: Some(Utc::now()),
        }
    }

    fn into_session(self) -> Option<StoredSession> {
        if self.auth_token.trim().is_empty() {
            return None;
        }
        Some(StoredSession::new(self.auth_token, self.user))
    }
}

/// Parse a stored document, treating anything malformed as absence.
fn decode(contents: &str, source: &str) -> Option<StoredSession> {
    match serde_json::from_str::<SessionDocument>(contents) {
        Ok(doc) => {
            let session = doc.into_session();
            if session.is_none() {
                warn!(source, "Stored session has an empty token, ignoring");
            }
            session
        }
        Err(e) => {
            warn!(source, error = %e, "Stored session is malformed, ignoring");
            None
        }
    }
}

/// Persistence adapter for the session pair.
///
/// Implementations serialize their own `save` and `clear` so the two can't
/// interleave into a token without its user (or the reverse).
pub trait CredentialStore: Send + Sync {
    /// The stored pair, or `None` if absent or unreadable.
    fn load(&self) -> Option<StoredSession>;

    /// Replace the stored pair.
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Remove the stored pair. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StoreError>;

    fn token(&self) -> Option<String> {
        self.load().map(|s| s.token)
    }
}

fn guard(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// File backend
// ============================================================================

/// Stores the session as one JSON document in the cache directory.
pub struct FileCredentialStore {
    cache_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", SESSION_FILE))
    }

    /// Write the document to the temp path, readable only by the owner.
    fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
        // A leftover temp file would keep its old mode through truncation
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(SESSION_FILE_MODE);
        }

        let mut file = options.open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn read(path: &Path) -> Option<StoredSession> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => decode(&contents, "file"),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to read session file");
                None
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<StoredSession> {
        let _guard = guard(&self.lock);
        Self::read(&self.path())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let _guard = guard(&self.lock);
        std::fs::create_dir_all(&self.cache_dir)?;
        let contents = serde_json::to_string_pretty(&SessionDocument::from_session(session))?;

        // Write-then-rename so a reader never sees half a document.
        let temp = self.temp_path();
        Self::write_private(&temp, &contents)?;
        std::fs::rename(&temp, self.path())?;
        debug!(user_id = session.user.id, "Session saved to disk");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = guard(&self.lock);
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!("Session file removed");
        }
        Ok(())
    }
}

// ============================================================================
// Keyring backend
// ============================================================================

/// Stores the session as a single secret in the OS keychain.
pub struct KeyringCredentialStore {
    service: String,
    lock: Mutex<()>,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            lock: Mutex::new(()),
        }
    }

    fn entry(&self) -> Result<Entry, keyring::Error> {
        Entry::new(&self.service, KEYRING_ACCOUNT)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Option<StoredSession> {
        let _guard = guard(&self.lock);
        let secret = match self.entry().and_then(|entry| entry.get_password()) {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read session from keychain");
                return None;
            }
        };
        decode(&secret, "keyring")
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let _guard = guard(&self.lock);
        let secret = serde_json::to_string(&SessionDocument::from_session(session))?;
        self.entry()?.set_password(&secret)?;
        debug!(user_id = session.user.id, "Session saved to keychain");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = guard(&self.lock);
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Memory backend
// ============================================================================

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredSession>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<StoredSession>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<StoredSession> {
        self.slot().clone()
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
