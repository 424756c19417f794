//! The single dispatch point for every call to the remote API.
//!
//! Outbound, the gateway snapshots the stored token and attaches it as a
//! bearer credential. Inbound, any 401 raises the unauthorized event before
//! the error is returned to the caller, whichever operation issued the call.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::models::Envelope;

use super::GatewayError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("sessiongate/", env!("CARGO_PKG_VERSION"));

/// Reacts to a rejected credential.
///
/// This is the one place where session state changes outside the call stack
/// that triggered it: an unrelated request (a vote, a project fetch) can end
/// the session. The gateway accepts exactly one listener.
pub trait UnauthorizedListener: Send + Sync {
    /// Called synchronously, before the 401 is returned to the caller.
    /// The listener owns clearing the store and resetting session state.
    fn on_unauthorized(&self, request: &PendingRequest);
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// A request as it leaves the gateway.
///
/// The token is captured when the request is built and is not touched again,
/// so a login or logout that lands mid-flight doesn't change what was sent.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    origin: String,
    token: Option<String>,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            origin: format!("{} {}", method, path),
            method,
            path,
            body: None,
            token: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Name of the logical operation, for logs and the redirect event.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Use an explicit token snapshot instead of the stored one.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

pub struct RequestGateway {
    client: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    listener: OnceLock<Arc<dyn UnauthorizedListener>>,
}

impl RequestGateway {
    pub fn new(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
            listener: OnceLock::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.store)
    }

    /// Register the single subscriber to the unauthorized event.
    pub fn set_unauthorized_listener(
        &self,
        listener: Arc<dyn UnauthorizedListener>,
    ) -> Result<(), GatewayError> {
        self.listener
            .set(listener)
            .map_err(|_| GatewayError::ListenerAlreadySet)
    }

    /// Build a request carrying the currently stored token, if any.
    pub fn prepare(&self, method: Method, path: &str) -> PendingRequest {
        PendingRequest::new(method, path).with_token(self.store.token())
    }

    pub async fn get(&self, path: &str) -> Result<Envelope, GatewayError> {
        self.dispatch(self.prepare(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope, GatewayError> {
        let request = self.prepare(Method::POST, path).with_body(serde_json::to_value(body)?);
        self.dispatch(request).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope, GatewayError> {
        let request = self.prepare(Method::PUT, path).with_body(serde_json::to_value(body)?);
        self.dispatch(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Envelope, GatewayError> {
        self.dispatch(self.prepare(Method::DELETE, path)).await
    }

    /// Send a prepared request and run the inbound hook on the response.
    pub async fn dispatch(&self, request: PendingRequest) -> Result<Envelope, GatewayError> {
        let url = self.url(&request.path);
        debug!(
            method = %request.method,
            path = %request.path,
            origin = %request.origin,
            authenticated = request.is_authenticated(),
            "Dispatching request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(ref token) = request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            return serde_json::from_str(&text).map_err(|e| {
                GatewayError::InvalidResponse(format!("{} from {}: {}", e, request.path, status))
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error = GatewayError::from_status(status, &body);
        if error.is_unauthorized() {
            self.raise_unauthorized(&request);
        } else {
            debug!(status = %status, path = %request.path, "Request failed");
        }
        Err(error)
    }

    fn raise_unauthorized(&self, request: &PendingRequest) {
        warn!(
            origin = %request.origin,
            path = %request.path,
            "Credential rejected, invalidating session"
        );
        match self.listener.get() {
            Some(listener) => listener.on_unauthorized(request),
            None => {
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear credential store");
                }
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
