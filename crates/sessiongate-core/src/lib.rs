//! Client-side session management for the AutoFounder API.
//!
//! `RequestGateway` carries every call to the remote API, attaching the
//! stored bearer token and reacting to rejected credentials. `SessionManager`
//! owns the authentication state on top of it, backed by a `CredentialStore`.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use sessiongate_core::{Config, SessionManager};
//!
//! let config = Config::load()?;
//! let session = SessionManager::new(Arc::new(config.gateway()?))?;
//! if session.restore() {
//!     // Render from the cached user right away, then confirm it.
//!     let _ = session.verify().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{AuthApi, GatewayConfig, GatewayError, PendingRequest, RequestGateway, UnauthorizedListener};
pub use auth::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
    SessionError, SessionEvent, SessionManager, SessionResult, SessionState, StoreError,
    StoredSession,
};
pub use config::{Config, StorageBackend};
pub use models::{Envelope, ProfileUpdate, Registration, UserRecord};
