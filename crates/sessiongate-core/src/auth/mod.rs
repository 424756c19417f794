//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: persistence of the token/user pair (file, keychain, memory)
//! - `SessionManager`: the session state machine and its operations
//! - `SessionState` / `SessionEvent`: what consumers render from and react to
//!
//! Tokens have no local expiry. A session ends on logout or when the server
//! rejects the token.

pub mod credentials;
pub mod error;
pub mod session;
pub mod state;

pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
    StoreError, StoredSession,
};
pub use error::{SessionError, SessionResult};
pub use session::SessionManager;
pub use state::{SessionEvent, SessionState};
