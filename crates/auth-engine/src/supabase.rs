//! Supabase Auth (GoTrue) REST client.
//!
//! The session lives in the local store under [`StorageKeys::AUTH_SESSION`]
//! so it survives restarts. Every state-changing operation publishes an
//! [`AuthChangeEvent`] on a broadcast channel.

use crate::{
    classify_provider_error, AccessTokenSource, AuthChangeEvent, AuthError, AuthResult,
    Identity, IdentityProvider, Session, SignUpOutcome, SignUpProfile, UserUpdate,
};
use app_config_and_utils::RetryPolicy;
use app_storage::{LocalStore, StorageKeys};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Refresh the access token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;

const EVENT_CAPACITY: usize = 32;

/// User object as returned by GoTrue.
#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

impl From<GoTrueUser> for Identity {
    fn from(user: GoTrueUser) -> Self {
        let display_name = ["display_name", "full_name", "name"]
            .iter()
            .find_map(|key| user.user_metadata.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        Identity {
            id: user.id,
            email: user.email,
            email_verified: user.email_confirmed_at.is_some(),
            display_name,
        }
    }
}

/// Token grant / refresh response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Build an [`AuthError`] from a non-success GoTrue response.
///
/// Handles both the current `{error_code, msg}` body and the older
/// `{error, error_description}` shape.
fn provider_error(status: StatusCode, body: &str) -> AuthError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed
        .get("error_code")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("error").and_then(Value::as_str));
    let message = ["msg", "message", "error_description"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));
    let kind = classify_provider_error(code, status.as_u16(), &message);
    AuthError::provider(kind, message)
}

/// Supabase-backed [`IdentityProvider`].
pub struct SupabaseIdentityProvider {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    store: LocalStore,
    events: broadcast::Sender<AuthChangeEvent>,
    refresh_policy: RetryPolicy,
    /// Serializes token refreshes so concurrent callers refresh once.
    refresh_lock: Mutex<()>,
    initial_emitted: AtomicBool,
}

impl SupabaseIdentityProvider {
    pub fn new(supabase_url: &str, publishable_key: &str, store: LocalStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http_client: Client::new(),
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
            store,
            events,
            refresh_policy: RetryPolicy::token_refresh(),
            refresh_lock: Mutex::new(()),
            initial_emitted: AtomicBool::new(false),
        }
    }

    pub fn with_refresh_policy(mut self, policy: RetryPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    async fn load_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.store.get_json(StorageKeys::AUTH_SESSION).await?)
    }

    async fn save_session(&self, session: &Session) -> AuthResult<()> {
        self.store
            .set_json(StorageKeys::AUTH_SESSION, session)
            .await?;
        Ok(())
    }

    async fn clear_session(&self) -> AuthResult<()> {
        self.store.remove(StorageKeys::AUTH_SESSION).await?;
        Ok(())
    }

    fn emit(&self, event: AuthChangeEvent) {
        debug!(event = event.name(), "Auth state change");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&Value>,
    ) -> AuthResult<Response> {
        let mut request = self
            .http_client
            .request(method, url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json");
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let err = provider_error(status, &body);
        warn!(status = %status, kind = %err.kind(), url = %url, "Identity provider request failed");
        Err(err)
    }

    async fn try_refresh(&self, refresh_token: &str) -> AuthResult<Session> {
        let url = self.auth_url("token?grant_type=refresh_token");
        debug!(url = %url, "Refreshing token");
        let response = self
            .send_json(
                reqwest::Method::POST,
                &url,
                None,
                Some(&json!({ "refresh_token": refresh_token })),
            )
            .await?;
        let data: TokenResponse = response.json().await?;
        Ok(data.into_session())
    }

    /// Refresh the stored session. Transient failures keep the session;
    /// a rejected refresh token signs the user out.
    async fn refresh_session(&self) -> AuthResult<Option<Session>> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let Some(current) = self.load_session().await? else {
            return Ok(None);
        };
        if !current.expires_within(REFRESH_MARGIN_SECS) {
            return Ok(Some(current));
        }

        let this = self;
        let refresh_token = current.refresh_token.as_str();
        let result = self
            .refresh_policy
            .run(
                move |_| this.try_refresh(refresh_token),
                AuthError::is_transient,
            )
            .await;

        match result {
            Ok(session) => {
                self.save_session(&session).await?;
                info!(user_id = %session.user.id, "Token refreshed successfully");
                self.emit(AuthChangeEvent::TokenRefreshed(session.user.clone()));
                Ok(Some(session))
            }
            Err(err) if err.is_transient() => {
                warn!(error = %err, "Token refresh failed, keeping session");
                Err(AuthError::RefreshExhausted(self.refresh_policy.max_attempts()))
            }
            Err(err) => {
                warn!(error = %err, "Refresh token rejected, clearing session");
                self.clear_session().await?;
                self.emit(AuthChangeEvent::SignedOut);
                Ok(None)
            }
        }
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<Identity> {
        let response = self
            .send_json(
                reqwest::Method::GET,
                &self.auth_url("user"),
                Some(access_token),
                None,
            )
            .await?;
        let user: GoTrueUser = response.json().await?;
        Ok(user.into())
    }

    /// Establish a session from the tokens carried by a password-recovery
    /// link and announce [`AuthChangeEvent::PasswordRecovery`].
    pub async fn recover_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: i64,
    ) -> AuthResult<Identity> {
        let user = self.fetch_user(access_token).await?;
        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            user: user.clone(),
        };
        self.save_session(&session).await?;
        info!(user_id = %user.id, "Recovery session established");
        self.emit(AuthChangeEvent::PasswordRecovery(Some(user.clone())));
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> AuthResult<SignUpOutcome> {
        let url = self.auth_url("signup");
        debug!(email = %email, "Signing up");
        let response = self
            .send_json(
                reqwest::Method::POST,
                &url,
                None,
                Some(&json!({
                    "email": email,
                    "password": password,
                    "data": profile,
                })),
            )
            .await?;
        let body: Value = response.json().await?;

        // Autoconfirm projects answer with a session, others with the user.
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(body)?.into_session();
            self.save_session(&session).await?;
            info!(user_id = %session.user.id, "Sign-up created a session");
            self.emit(AuthChangeEvent::SignedIn(session.user.clone()));
            return Ok(SignUpOutcome {
                identity: session.user,
                confirmation_required: false,
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let identity: Identity = serde_json::from_value::<GoTrueUser>(user_value)?.into();
        info!(user_id = %identity.id, "Sign-up awaiting email confirmation");
        Ok(SignUpOutcome {
            identity,
            confirmation_required: true,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let url = self.auth_url("token?grant_type=password");
        debug!(url = %url, email = %email, "Attempting email/password login");

        let response = self
            .send_json(
                reqwest::Method::POST,
                &url,
                None,
                Some(&json!({ "email": email, "password": password })),
            )
            .await?;
        let session = response.json::<TokenResponse>().await?.into_session();
        self.save_session(&session).await?;

        info!(user_id = %session.user.id, "Login successful");
        self.emit(AuthChangeEvent::SignedIn(session.user.clone()));
        Ok(session.user)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if let Some(session) = self.load_session().await? {
            // Server-side revocation is best effort; the local session goes
            // away regardless.
            if let Err(err) = self
                .send_json(
                    reqwest::Method::POST,
                    &self.auth_url("logout"),
                    Some(&session.access_token),
                    None,
                )
                .await
            {
                warn!(error = %err, "Server logout failed, clearing local session anyway");
            }
        }

        self.clear_session().await?;
        info!("Logged out");
        self.emit(AuthChangeEvent::SignedOut);
        Ok(())
    }

    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let session = self.load_session().await?;
        if !self.initial_emitted.swap(true, Ordering::SeqCst) {
            self.emit(AuthChangeEvent::InitialSession(
                session.as_ref().map(|s| s.user.clone()),
            ));
        }

        let Some(session) = session else {
            debug!("No stored session");
            return Ok(None);
        };
        if !session.expires_within(REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }
        self.refresh_session().await
    }

    async fn get_user(&self) -> AuthResult<Option<Identity>> {
        let Some(mut session) = self.get_session().await? else {
            return Ok(None);
        };
        let user = self.fetch_user(&session.access_token).await?;
        if user != session.user {
            session.user = user.clone();
            self.save_session(&session).await?;
            self.emit(AuthChangeEvent::UserUpdated(user.clone()));
        }
        Ok(Some(user))
    }

    async fn update_user(&self, update: &UserUpdate) -> AuthResult<Identity> {
        if update.is_empty() {
            return Err(AuthError::Config("No user fields to update".to_string()));
        }
        let mut session = self.get_session().await?.ok_or(AuthError::NotLoggedIn)?;

        let mut body = Map::new();
        if let Some(email) = &update.email {
            body.insert("email".to_string(), Value::from(email.as_str()));
        }
        if let Some(password) = &update.password {
            body.insert("password".to_string(), Value::from(password.as_str()));
        }
        if let Some(display_name) = &update.display_name {
            body.insert(
                "data".to_string(),
                json!({ "display_name": display_name }),
            );
        }

        let response = self
            .send_json(
                reqwest::Method::PUT,
                &self.auth_url("user"),
                Some(&session.access_token),
                Some(&Value::Object(body)),
            )
            .await?;
        let user: Identity = response.json::<GoTrueUser>().await?.into();

        session.user = user.clone();
        self.save_session(&session).await?;
        info!(user_id = %user.id, "User updated");
        self.emit(AuthChangeEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    async fn resend_verification(&self, email: &str) -> AuthResult<()> {
        self.send_json(
            reqwest::Method::POST,
            &self.auth_url("resend"),
            None,
            Some(&json!({ "type": "signup", "email": email })),
        )
        .await?;
        info!(email = %email, "Verification email resent");
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> AuthResult<()> {
        self.send_json(
            reqwest::Method::POST,
            &self.auth_url("recover"),
            None,
            Some(&json!({ "email": email })),
        )
        .await?;
        info!(email = %email, "Password reset email requested");
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl AccessTokenSource for SupabaseIdentityProvider {
    async fn access_token(&self) -> AuthResult<Option<String>> {
        Ok(self.get_session().await?.map(|s| s.access_token))
    }
}
