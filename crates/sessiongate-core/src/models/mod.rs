//! Data models shared by the gateway and the session manager.
//!
//! - `UserRecord`: cached profile of the signed-in user
//! - `ProfileUpdate`, `Registration`: request bodies for the auth endpoints
//! - `Envelope`: the uniform `{success, message, ...}` response wrapper

pub mod envelope;
pub mod user;

pub use envelope::Envelope;
pub use user::{ProfileUpdate, Registration, UserRecord};
