use reqwest::StatusCode;
use thiserror::Error;

use crate::models::Envelope;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized - session is no longer valid")]
    Unauthorized { message: Option<String> },

    #[error("Request failed with status {status}")]
    Status {
        status: StatusCode,
        /// Envelope message, when the body had one
        message: Option<String>,
        /// Truncated raw body, for logs
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("An unauthorized listener is already registered")]
    ListenerAlreadySet,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl GatewayError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a non-success response. The envelope's message, if the body
    /// has one, is carried along for display.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Envelope>(body)
            .ok()
            .and_then(|env| env.message)
            .filter(|m| !m.trim().is_empty());

        match status {
            StatusCode::UNAUTHORIZED => GatewayError::Unauthorized { message },
            _ => GatewayError::Status {
                status,
                message,
                body: Self::truncate_body(body),
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }

    /// Message the server put in the envelope, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            GatewayError::Unauthorized { message } => message.as_deref(),
            GatewayError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}
