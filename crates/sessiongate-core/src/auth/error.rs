use thiserror::Error;

/// Outcome of a failed session operation.
///
/// Every variant carries (or implies) a message suitable for display; callers
/// match on it only when they need to tell the cases apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The server answered `success: false`.
    #[error("{0}")]
    Rejected(String),

    /// The server rejected the credential and the session was torn down.
    #[error("{0}")]
    Unauthorized(String),

    /// No usable response (network, timeout, unexpected payload).
    #[error("{0}")]
    Failed(String),

    #[error("Not signed in")]
    NotSignedIn,

    /// The session changed while the request was in flight, so the result
    /// was discarded.
    #[error("Session ended before the request completed")]
    Superseded,

    #[error("Could not save session: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
