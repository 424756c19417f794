//! Session lifecycle: restore, verify, login, register, logout, profile edits.
//!
//! `SessionManager` owns the current `SessionState`. Every operation returns a
//! `SessionResult`; none of them panic or leak transport errors.
//!
//! State and store changes happen together in short critical sections that
//! never span an `.await`. Each operation records the session epoch before
//! its request goes out, and logout, login and invalidation all advance it.
//! A response that comes back under a different epoch is dropped, so a
//! forced sign-out is never undone by a success that arrives later.
//!
//! A separate profile revision advances on every successful profile edit, so
//! a verification that was sent before the edit can't roll it back.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::{AuthApi, GatewayError, PendingRequest, RequestGateway, UnauthorizedListener};
use crate::models::{Envelope, ProfileUpdate, Registration, UserRecord};

use super::{CredentialStore, SessionError, SessionEvent, SessionResult, SessionState, StoredSession};

/// Buffer size for lifecycle events.
/// Consumers that fall further behind than this see a `Lagged` error.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Message used when the server rejects the credential without saying why.
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const PROFILE_UPDATE_FAILED: &str = "Profile update failed";
const PASSWORD_CHANGE_FAILED: &str = "Password change failed";
const VERIFICATION_FAILED: &str = "Profile verification failed";
const PASSWORD_CHANGED: &str = "Password changed successfully";

struct Ledger {
    state: SessionState,
    epoch: u64,
    revision: u64,
}

/// State shared between the manager and the gateway's unauthorized hook.
struct SessionShared {
    store: Arc<dyn CredentialStore>,
    ledger: Mutex<Ledger>,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionShared {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, ledger: &mut Ledger, next: SessionState) {
        if ledger.state != next {
            info!(from = ledger.state.label(), to = next.label(), "Session state changed");
        }
        ledger.state = next.clone();
        self.state_tx.send_replace(next);
    }

    /// Clear the store and drop to `Unauthenticated`, retiring the epoch.
    fn invalidate(&self, ledger: &mut Ledger) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }
        ledger.epoch += 1;
        self.set_state(ledger, SessionState::Unauthenticated);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }
}

impl UnauthorizedListener for SessionShared {
    fn on_unauthorized(&self, request: &PendingRequest) {
        let signing_out = {
            let mut ledger = self.ledger();
            let signing_out = ledger.state == SessionState::Invalidating;
            self.invalidate(&mut ledger);
            signing_out
        };

        // The user is already leaving; a rejected logout is not a redirect.
        if signing_out {
            debug!(origin = request.origin(), "Unauthorized during sign-out");
            return;
        }
        self.emit(SessionEvent::RedirectToLogin {
            origin: request.origin().to_string(),
        });
    }
}

/// Map a gateway result onto the session error taxonomy.
///
/// Only a successful envelope passes through.
fn settle(result: Result<Envelope, GatewayError>, fallback: &str) -> SessionResult<Envelope> {
    match result {
        Ok(env) if env.success => Ok(env),
        Ok(env) => Err(SessionError::Rejected(env.message_or(fallback))),
        Err(GatewayError::Unauthorized { message }) => Err(SessionError::Unauthorized(
            message.unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string()),
        )),
        Err(GatewayError::Status {
            message: Some(message),
            ..
        }) => Err(SessionError::Rejected(message)),
        Err(e) => {
            warn!(error = %e, "Request failed");
            Err(SessionError::Failed(fallback.to_string()))
        }
    }
}

pub struct SessionManager {
    api: AuthApi,
    shared: Arc<SessionShared>,
}

impl SessionManager {
    /// Create the manager and register it as the gateway's unauthorized
    /// listener. Starts `Unauthenticated`; call `restore` or `startup` to pick
    /// up a stored session.
    pub fn new(gateway: Arc<RequestGateway>) -> Result<Self, GatewayError> {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(SessionShared {
            store: gateway.store(),
            ledger: Mutex::new(Ledger {
                state: SessionState::Unauthenticated,
                epoch: 0,
                revision: 0,
            }),
            state_tx,
            events_tx,
        });
        gateway.set_unauthorized_listener(shared.clone())?;

        Ok(Self {
            api: AuthApi::new(gateway),
            shared,
        })
    }

    pub fn api(&self) -> &AuthApi {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        self.shared.ledger().state.clone()
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.shared.ledger().state.user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.ledger().state.has_session()
    }

    /// Watch state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    // ===== Startup =====

    /// Adopt the stored session without a network round trip.
    ///
    /// Returns `true` if a token/user pair was found; the state is then
    /// `OptimisticAuthenticated` until `verify` settles it. Anything unusable
    /// in the store is wiped.
    pub fn restore(&self) -> bool {
        let mut ledger = self.shared.ledger();
        match self.shared.store.load() {
            Some(stored) => {
                debug!(user_id = stored.user.id, "Restored cached session");
                self.shared
                    .set_state(&mut ledger, SessionState::OptimisticAuthenticated(stored.user));
                true
            }
            None => {
                if let Err(e) = self.shared.store.clear() {
                    warn!(error = %e, "Failed to clear credential store");
                }
                false
            }
        }
    }

    /// Confirm the current session with the server.
    ///
    /// Any failure, including a network error, ends the session. If the
    /// profile was edited while the request was in flight, the session is
    /// confirmed but the newer cached record is kept.
    pub async fn verify(&self) -> SessionResult<UserRecord> {
        let (epoch, revision) = {
            let ledger = self.shared.ledger();
            if !ledger.state.has_session() {
                return Err(SessionError::NotSignedIn);
            }
            (ledger.epoch, ledger.revision)
        };

        let result = match settle(self.api.profile().await, VERIFICATION_FAILED) {
            // The gateway already tore the session down.
            Err(SessionError::Unauthorized(message)) => {
                return Err(SessionError::Unauthorized(message))
            }
            other => other,
        };

        let mut ledger = self.shared.ledger();
        if ledger.epoch != epoch || !ledger.state.has_session() {
            debug!("Discarding verification result for a retired session");
            return Err(SessionError::Superseded);
        }

        let failure = match result {
            Ok(Envelope { user: Some(_), .. }) if ledger.revision != revision => {
                match ledger.state.user().cloned() {
                    Some(user) => {
                        debug!("Profile changed during verification, keeping cached user");
                        self.shared
                            .set_state(&mut ledger, SessionState::Authenticated(user.clone()));
                        return Ok(user);
                    }
                    None => SessionError::Failed(VERIFICATION_FAILED.to_string()),
                }
            }
            Ok(Envelope { user: Some(user), .. }) => {
                match self.shared.store.token() {
                    Some(token) => {
                        if let Err(e) = self.shared.store.save(&StoredSession::new(token, user.clone())) {
                            warn!(error = %e, "Failed to refresh cached user");
                        }
                        self.shared
                            .set_state(&mut ledger, SessionState::Authenticated(user.clone()));
                        return Ok(user);
                    }
                    None => SessionError::Failed(VERIFICATION_FAILED.to_string()),
                }
            }
            Ok(_) => SessionError::Failed(VERIFICATION_FAILED.to_string()),
            Err(e) => e,
        };

        info!(reason = %failure, "Session verification failed, signing out");
        self.shared.invalidate(&mut ledger);
        drop(ledger);
        self.shared.emit(SessionEvent::RedirectToLogin {
            origin: "verify".to_string(),
        });
        Err(failure)
    }

    /// `restore` then `verify`. Returns the verified user, or `None` if there
    /// was no stored session.
    pub async fn startup(&self) -> SessionResult<Option<UserRecord>> {
        if !self.restore() {
            return Ok(None);
        }
        self.verify().await.map(Some)
    }

    // ===== Sign in / out =====

    pub async fn login(&self, email: &str, password: &str) -> SessionResult<UserRecord> {
        let epoch = self.shared.ledger().epoch;
        let env = settle(self.api.login(email, password).await, LOGIN_FAILED)?;
        self.establish(epoch, env, LOGIN_FAILED)
    }

    pub async fn register(&self, registration: &Registration) -> SessionResult<UserRecord> {
        let epoch = self.shared.ledger().epoch;
        let env = settle(self.api.register(registration).await, REGISTRATION_FAILED)?;
        self.establish(epoch, env, REGISTRATION_FAILED)
    }

    /// Persist a freshly issued token and become `Authenticated`.
    fn establish(&self, epoch: u64, env: Envelope, fallback: &str) -> SessionResult<UserRecord> {
        let (token, user) = match (env.token, env.user) {
            (Some(token), Some(user)) if !token.trim().is_empty() => (token, user),
            _ => {
                warn!("Auth response is missing token or user");
                return Err(SessionError::Failed(fallback.to_string()));
            }
        };

        let mut ledger = self.shared.ledger();
        if ledger.epoch != epoch {
            info!("Session was invalidated while signing in, discarding token");
            return Err(SessionError::Superseded);
        }

        if let Err(e) = self.shared.store.save(&StoredSession::new(token, user.clone())) {
            warn!(error = %e, "Failed to persist session");
            self.shared.invalidate(&mut ledger);
            return Err(SessionError::Storage(e.to_string()));
        }
        ledger.epoch += 1;
        self.shared
            .set_state(&mut ledger, SessionState::Authenticated(user.clone()));
        drop(ledger);

        self.shared.emit(SessionEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// Sign out locally, then tell the server.
    ///
    /// The store is cleared before the request goes out and the session ends
    /// even if the server can't be reached.
    pub async fn logout(&self) -> SessionResult<()> {
        let snapshot = {
            let mut ledger = self.shared.ledger();
            let token = self.shared.store.token();
            if let Err(e) = self.shared.store.clear() {
                warn!(error = %e, "Failed to clear credential store");
            }
            ledger.epoch += 1;
            self.shared.set_state(&mut ledger, SessionState::Invalidating);
            token
        };

        if let Some(token) = snapshot {
            match self.api.logout(token).await {
                Ok(env) if env.success => debug!("Server acknowledged logout"),
                Ok(env) => warn!(message = ?env.message, "Server refused logout"),
                Err(e) => warn!(error = %e, "Logout request failed"),
            }
        }

        {
            let mut ledger = self.shared.ledger();
            if ledger.state == SessionState::Invalidating {
                self.shared
                    .set_state(&mut ledger, SessionState::Unauthenticated);
            }
        }
        self.shared.emit(SessionEvent::SignedOut);
        Ok(())
    }

    // ===== Profile =====

    /// Apply a partial profile edit. Only the supplied fields change in the
    /// cached record.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> SessionResult<UserRecord> {
        let epoch = {
            let ledger = self.shared.ledger();
            let Some(user) = ledger.state.user() else {
                return Err(SessionError::NotSignedIn);
            };
            if update.is_empty() {
                return Ok(user.clone());
            }
            ledger.epoch
        };

        let env = settle(self.api.update_profile(update).await, PROFILE_UPDATE_FAILED)?;

        let mut ledger = self.shared.ledger();
        if ledger.epoch != epoch {
            info!("Session ended while updating profile, discarding result");
            return Err(SessionError::Superseded);
        }
        let (Some(mut user), Some(token)) =
            (ledger.state.user().cloned(), self.shared.store.token())
        else {
            return Err(SessionError::Superseded);
        };

        user.merge_update(update, env.user.as_ref());
        self.shared
            .store
            .save(&StoredSession::new(token, user.clone()))
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        ledger.revision += 1;
        let next = ledger.state.with_user(user.clone());
        self.shared.set_state(&mut ledger, next);
        Ok(user)
    }

    /// Change the account password. Session state is untouched.
    pub async fn change_password(&self, current: &str, new: &str) -> SessionResult<String> {
        if !self.is_authenticated() {
            return Err(SessionError::NotSignedIn);
        }
        let env = settle(
            self.api.change_password(current, new).await,
            PASSWORD_CHANGE_FAILED,
        )?;
        Ok(env.message_or(PASSWORD_CHANGED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_success_passes_through() {
        let env = Envelope {
            success: true,
            ..Default::default()
        };
        assert!(settle(Ok(env), LOGIN_FAILED).is_ok());
    }

    #[test]
    fn test_settle_application_failure() {
        let env = Envelope {
            success: false,
            message: Some("Email already registered".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settle(Ok(env), REGISTRATION_FAILED).unwrap_err(),
            SessionError::Rejected("Email already registered".to_string())
        );
        assert_eq!(
            settle(Ok(Envelope::default()), REGISTRATION_FAILED).unwrap_err(),
            SessionError::Rejected(REGISTRATION_FAILED.to_string())
        );
    }

    #[test]
    fn test_settle_unauthorized() {
        let err = settle(
            Err(GatewayError::Unauthorized {
                message: Some("Invalid email or password".to_string()),
            }),
            LOGIN_FAILED,
        )
        .unwrap_err();
        assert_eq!(err.message(), "Invalid email or password");

        let err = settle(Err(GatewayError::Unauthorized { message: None }), LOGIN_FAILED)
            .unwrap_err();
        assert_eq!(err, SessionError::Unauthorized(SESSION_EXPIRED_MESSAGE.to_string()));
    }

    #[test]
    fn test_settle_generic_failure_uses_fallback() {
        let err = settle(
            Err(GatewayError::InvalidResponse("garbage".to_string())),
            PROFILE_UPDATE_FAILED,
        )
        .unwrap_err();
        assert_eq!(err, SessionError::Failed(PROFILE_UPDATE_FAILED.to_string()));

        let err = settle(
            Err(GatewayError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                message: None,
                body: "oops".to_string(),
            }),
            PASSWORD_CHANGE_FAILED,
        )
        .unwrap_err();
        assert_eq!(err.message(), PASSWORD_CHANGE_FAILED);
    }
}
