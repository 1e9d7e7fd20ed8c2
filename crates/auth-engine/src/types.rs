use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The authenticated user as reported by the identity provider.
///
/// Replaced wholesale on every change; never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// Tokens plus the identity they belong to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl Session {
    /// True when the access token expires within `margin_secs` from now.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at <= Utc::now() + chrono::Duration::seconds(margin_secs)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Change notification emitted by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChangeEvent {
    /// Session restored from local storage on first load.
    InitialSession(Option<Identity>),
    SignedIn(Identity),
    SignedOut,
    TokenRefreshed(Identity),
    UserUpdated(Identity),
    /// A password-recovery link established a session.
    PasswordRecovery(Option<Identity>),
}

impl AuthChangeEvent {
    /// The new current user implied by this event.
    ///
    /// Returns `None` when the event carries no information about the user
    /// (a recovery event without a session).
    pub fn user_change(&self) -> Option<Option<&Identity>> {
        match self {
            AuthChangeEvent::InitialSession(user) => Some(user.as_ref()),
            AuthChangeEvent::SignedIn(user)
            | AuthChangeEvent::TokenRefreshed(user)
            | AuthChangeEvent::UserUpdated(user) => Some(Some(user)),
            AuthChangeEvent::SignedOut => Some(None),
            AuthChangeEvent::PasswordRecovery(Some(user)) => Some(Some(user)),
            AuthChangeEvent::PasswordRecovery(None) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthChangeEvent::InitialSession(_) => "initial_session",
            AuthChangeEvent::SignedIn(_) => "signed_in",
            AuthChangeEvent::SignedOut => "signed_out",
            AuthChangeEvent::TokenRefreshed(_) => "token_refreshed",
            AuthChangeEvent::UserUpdated(_) => "user_updated",
            AuthChangeEvent::PasswordRecovery(_) => "password_recovery",
        }
    }
}

/// Profile fields attached to a new account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignUpProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Extra metadata stored alongside the account.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Result of a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub identity: Identity,
    /// The provider sent a confirmation email; no session exists yet.
    pub confirmation_required: bool,
}

/// Fields a signed-in user may change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none() && self.display_name.is_none()
    }
}
