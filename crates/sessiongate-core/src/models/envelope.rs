use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::UserRecord;

/// The uniform response shape every endpoint returns.
///
/// `success: false` is a recoverable application error and `message` is meant
/// for display. Endpoint-specific fields that aren't part of the auth contract
/// land in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Message for a failed envelope, or `fallback` if the server sent none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}
