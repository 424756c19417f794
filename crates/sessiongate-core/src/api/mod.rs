//! Outbound API access.
//!
//! `RequestGateway` is the only thing that talks HTTP. It attaches the stored
//! bearer token to each call and turns a 401 from any endpoint into the
//! unauthorized event. `AuthApi` layers typed auth endpoints on top of it.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::AuthApi;
pub use error::GatewayError;
pub use gateway::{GatewayConfig, PendingRequest, RequestGateway, UnauthorizedListener};
