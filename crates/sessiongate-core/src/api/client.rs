//! Typed calls for the remote auth endpoints.
//!
//! Everything here goes through the `RequestGateway`; this module only knows
//! paths and request bodies.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;

use crate::models::{Envelope, ProfileUpdate, Registration};

use super::{GatewayError, RequestGateway};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Auth endpoints of the remote API.
/// Clone is cheap - the gateway is shared.
#[derive(Clone)]
pub struct AuthApi {
    gateway: Arc<RequestGateway>,
}

impl AuthApi {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        origin: &str,
        body: Option<&B>,
    ) -> Result<Envelope, GatewayError> {
        let mut request = self.gateway.prepare(method, path).with_origin(origin);
        if let Some(body) = body {
            request = request.with_body(serde_json::to_value(body)?);
        }
        self.gateway.dispatch(request).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Envelope, GatewayError> {
        let body = LoginRequest { email, password };
        self.send(Method::POST, "/auth/login", "login", Some(&body)).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<Envelope, GatewayError> {
        self.send(Method::POST, "/auth/register", "register", Some(registration))
            .await
    }

    /// Logout uses the caller's token snapshot; the store is already empty
    /// by the time this runs.
    pub async fn logout(&self, token: String) -> Result<Envelope, GatewayError> {
        let request = self
            .gateway
            .prepare(Method::POST, "/auth/logout")
            .with_origin("logout")
            .with_token(Some(token));
        self.gateway.dispatch(request).await
    }

    pub async fn profile(&self) -> Result<Envelope, GatewayError> {
        self.send::<()>(Method::GET, "/auth/profile", "verify", None).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Envelope, GatewayError> {
        self.send(Method::PUT, "/auth/profile", "update-profile", Some(update))
            .await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<Envelope, GatewayError> {
        let body = ChangePasswordRequest {
            current_password,
            new_password,
        };
        self.send(Method::POST, "/auth/change-password", "change-password", Some(&body))
            .await
    }

    pub async fn health(&self) -> Result<Envelope, GatewayError> {
        self.send::<()>(Method::GET, "/health", "health", None).await
    }
}
