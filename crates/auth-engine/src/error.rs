//! Authentication error types.

use thiserror::Error;

/// Closed classification of identity-provider failures.
///
/// UI and retry decisions branch on this instead of on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    InvalidCredentials,
    /// Credentials are right but the address was never confirmed.
    EmailNotConfirmed,
    UserAlreadyRegistered,
    WeakPassword,
    RateLimited,
    /// No session, or the session is no longer known to the provider.
    /// Expected absence, not a failure.
    SessionMissing,
    Network,
    Server,
    Unknown,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "invalid_credentials",
            AuthErrorKind::EmailNotConfirmed => "email_not_confirmed",
            AuthErrorKind::UserAlreadyRegistered => "user_already_registered",
            AuthErrorKind::WeakPassword => "weak_password",
            AuthErrorKind::RateLimited => "rate_limited",
            AuthErrorKind::SessionMissing => "session_missing",
            AuthErrorKind::Network => "network",
            AuthErrorKind::Server => "server",
            AuthErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Rejected by the identity provider
    #[error("Provider error ({kind}): {message}")]
    Provider { kind: AuthErrorKind, message: String },

    /// Operation needs a session and there is none
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session expired and refresh was rejected
    #[error("Session expired")]
    SessionExpired,

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// A session observer accepts a single subscription
    #[error("Observer already has a subscriber")]
    AlreadySubscribed,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] app_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub fn provider(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        AuthError::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Classification used by callers that branch on the failure.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::Provider { kind, .. } => *kind,
            AuthError::NotLoggedIn | AuthError::SessionExpired => AuthErrorKind::SessionMissing,
            AuthError::RefreshExhausted(_)
            | AuthError::Timeout
            | AuthError::NetworkUnavailable => AuthErrorKind::Network,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return AuthErrorKind::Network;
                }
                match e.status() {
                    Some(status) if status.is_server_error() => AuthErrorKind::Server,
                    Some(status) if status.as_u16() == 429 => AuthErrorKind::RateLimited,
                    _ => AuthErrorKind::Unknown,
                }
            }
            _ => AuthErrorKind::Unknown,
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable and timeouts
    /// - connection failures
    /// - 5xx responses
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), AuthErrorKind::Network | AuthErrorKind::Server)
    }

    /// True for the "no session" condition, which is not a failure.
    pub fn is_session_missing(&self) -> bool {
        self.kind() == AuthErrorKind::SessionMissing
    }
}

/// Map a provider error response onto [`AuthErrorKind`].
///
/// `code` is the provider's machine-readable error code when present. HTTP
/// status comes next; message text is only consulted when neither decides.
pub fn classify_provider_error(code: Option<&str>, status: u16, message: &str) -> AuthErrorKind {
    if let Some(code) = code {
        match code {
            "email_not_confirmed" => return AuthErrorKind::EmailNotConfirmed,
            "invalid_credentials" | "invalid_grant" => return AuthErrorKind::InvalidCredentials,
            "user_already_exists" | "email_exists" => return AuthErrorKind::UserAlreadyRegistered,
            "weak_password" => return AuthErrorKind::WeakPassword,
            "over_request_rate_limit" | "over_email_send_rate_limit" => {
                return AuthErrorKind::RateLimited
            }
            "session_not_found" | "refresh_token_not_found" | "refresh_token_already_used" => {
                return AuthErrorKind::SessionMissing
            }
            _ => {}
        }
    }

    match status {
        429 => return AuthErrorKind::RateLimited,
        500..=599 => return AuthErrorKind::Server,
        _ => {}
    }

    let lower = message.to_ascii_lowercase();
    if lower.contains("email not confirmed") {
        AuthErrorKind::EmailNotConfirmed
    } else if lower.contains("invalid login credentials") {
        AuthErrorKind::InvalidCredentials
    } else if lower.contains("already registered") {
        AuthErrorKind::UserAlreadyRegistered
    } else if lower.contains("password should be") {
        AuthErrorKind::WeakPassword
    } else if lower.contains("auth session missing") {
        AuthErrorKind::SessionMissing
    } else {
        AuthErrorKind::Unknown
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_network_unavailable() {
        assert!(AuthError::NetworkUnavailable.is_transient());
        assert!(AuthError::Timeout.is_transient());
    }

    #[test]
    fn test_server_provider_error_is_transient() {
        assert!(AuthError::provider(AuthErrorKind::Server, "boom").is_transient());
    }

    #[test]
    fn test_is_not_transient_invalid_credentials() {
        let err = AuthError::provider(AuthErrorKind::InvalidCredentials, "bad password");
        assert!(!err.is_transient());
        assert_eq!(err.kind(), AuthErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_session_missing_variants() {
        assert!(AuthError::NotLoggedIn.is_session_missing());
        assert!(AuthError::SessionExpired.is_session_missing());
        assert!(AuthError::provider(AuthErrorKind::SessionMissing, "gone").is_session_missing());
        assert!(!AuthError::Timeout.is_session_missing());
    }

    #[test]
    fn test_classify_by_code_wins_over_status() {
        assert_eq!(
            classify_provider_error(Some("email_not_confirmed"), 400, "whatever"),
            AuthErrorKind::EmailNotConfirmed
        );
        assert_eq!(
            classify_provider_error(Some("over_request_rate_limit"), 400, ""),
            AuthErrorKind::RateLimited
        );
        assert_eq!(
            classify_provider_error(Some("refresh_token_not_found"), 400, ""),
            AuthErrorKind::SessionMissing
        );
    }

    #[test]
    fn test_classify_by_status() {
        assert_eq!(classify_provider_error(None, 429, ""), AuthErrorKind::RateLimited);
        assert_eq!(classify_provider_error(None, 503, ""), AuthErrorKind::Server);
        assert_eq!(
            classify_provider_error(Some("unexpected_failure"), 500, ""),
            AuthErrorKind::Server
        );
    }

    #[test]
    fn test_classify_message_fallback() {
        assert_eq!(
            classify_provider_error(None, 400, "Email not confirmed"),
            AuthErrorKind::EmailNotConfirmed
        );
        assert_eq!(
            classify_provider_error(None, 400, "Invalid login credentials"),
            AuthErrorKind::InvalidCredentials
        );
        assert_eq!(
            classify_provider_error(None, 422, "User already registered"),
            AuthErrorKind::UserAlreadyRegistered
        );
        assert_eq!(
            classify_provider_error(None, 422, "Password should be at least 6 characters"),
            AuthErrorKind::WeakPassword
        );
        assert_eq!(classify_provider_error(None, 400, "nope"), AuthErrorKind::Unknown);
    }
}
