use serde::Serialize;

use crate::models::UserRecord;

/// Where the session currently stands.
///
/// A token is persisted exactly when the state is `OptimisticAuthenticated`
/// or `Authenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "phase", content = "user")]
pub enum SessionState {
    Unauthenticated,
    /// Restored from the local cache; the server hasn't confirmed it yet.
    OptimisticAuthenticated(UserRecord),
    /// Confirmed by the server.
    Authenticated(UserRecord),
    /// Logout in progress. The store is already cleared.
    Invalidating,
}

impl SessionState {
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            SessionState::OptimisticAuthenticated(user) | SessionState::Authenticated(user) => {
                Some(user)
            }
            SessionState::Unauthenticated | SessionState::Invalidating => None,
        }
    }

    /// True in either authenticated phase.
    pub fn has_session(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::OptimisticAuthenticated(_) => "optimistic",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Invalidating => "invalidating",
        }
    }

    /// Same phase, different user.
    pub(crate) fn with_user(&self, user: UserRecord) -> Self {
        match self {
            SessionState::OptimisticAuthenticated(_) => SessionState::OptimisticAuthenticated(user),
            _ => SessionState::Authenticated(user),
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.user() {
            Some(user) => write!(f, "{} as {}", self.label(), user.username),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Lifecycle notifications for the consumer surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(UserRecord),
    SignedOut,
    /// The server rejected the credential. Consumers should navigate to
    /// their sign-in entry point.
    RedirectToLogin { origin: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_accessor() {
        let user = UserRecord::new(1, "a");
        assert_eq!(SessionState::Unauthenticated.user(), None);
        assert_eq!(SessionState::Invalidating.user(), None);
        assert_eq!(
            SessionState::OptimisticAuthenticated(user.clone()).user(),
            Some(&user)
        );
        assert!(SessionState::Authenticated(user.clone()).is_verified());
        assert!(!SessionState::OptimisticAuthenticated(user).is_verified());
    }

    #[test]
    fn test_with_user_keeps_phase() {
        let old = UserRecord::new(1, "a");
        let new = UserRecord::new(1, "b");
        assert_eq!(
            SessionState::OptimisticAuthenticated(old.clone()).with_user(new.clone()),
            SessionState::OptimisticAuthenticated(new.clone())
        );
        assert_eq!(
            SessionState::Authenticated(old).with_user(new.clone()),
            SessionState::Authenticated(new)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Unauthenticated.to_string(), "unauthenticated");
        assert_eq!(
            SessionState::Authenticated(UserRecord::new(1, "ada")).to_string(),
            "authenticated as ada"
        );
    }

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_value(SessionState::Authenticated(UserRecord::new(1, "a")))
            .expect("serialize");
        assert_eq!(json["phase"], "Authenticated");
        assert_eq!(json["user"]["username"], "a");
        let json = serde_json::to_value(SessionState::Unauthenticated).expect("serialize");
        assert_eq!(json, serde_json::json!({"phase": "Unauthenticated"}));
    }
}
