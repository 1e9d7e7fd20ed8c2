//! Identity provider contract.

use crate::{
    AuthChangeEvent, AuthResult, Identity, Session, SignUpOutcome, SignUpProfile, UserUpdate,
};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Operations the core needs from the authentication backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> AuthResult<SignUpOutcome>;

    /// Fails with [`crate::AuthErrorKind::EmailNotConfirmed`] when the
    /// account exists but was never confirmed.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Identity>;

    async fn sign_out(&self) -> AuthResult<()>;

    /// Current session, refreshed if close to expiry. `Ok(None)` when there
    /// is no session.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Current user as known by the provider. `Ok(None)` when there is no
    /// session.
    async fn get_user(&self) -> AuthResult<Option<Identity>>;

    async fn update_user(&self, update: &UserUpdate) -> AuthResult<Identity>;

    async fn resend_verification(&self, email: &str) -> AuthResult<()>;

    async fn reset_password_for_email(&self, email: &str) -> AuthResult<()>;

    /// Change notification stream. Dropping the receiver unsubscribes.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent>;
}

/// Bearer token for calls made on behalf of the signed-in user.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// `Ok(None)` when nobody is signed in.
    async fn access_token(&self) -> AuthResult<Option<String>>;
}

/// Token source returning a fixed value.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessToken(pub Option<String>);

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> AuthResult<Option<String>> {
        Ok(self.0.clone())
    }
}
