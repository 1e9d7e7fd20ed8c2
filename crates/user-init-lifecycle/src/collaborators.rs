//! Backing-data collaborators: verification and (re)creation of the records
//! a signed-in user needs.

use crate::{CollaboratorError, CollaboratorResult};
use async_trait::async_trait;
use auth_engine::AccessTokenSource;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Reports whether a user's required backing records exist.
#[async_trait]
pub trait BackingDataVerifier: Send + Sync {
    async fn has_backing_data(&self, user_id: &str) -> CollaboratorResult<bool>;
}

/// Creates or repairs a user's backing records. Must be idempotent.
#[async_trait]
pub trait BackingDataInitializer: Send + Sync {
    async fn initialize_backing_data(&self, user_id: &str) -> CollaboratorResult<()>;
}

/// PostgREST implementation of both collaborators.
///
/// Verification requires a `profiles` row and a `usage_limits` row;
/// initialization calls the `initialize_user_data` RPC, which upserts both.
#[derive(Clone)]
pub struct SupabaseBackingData {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl SupabaseBackingData {
    pub fn new(
        api_url: impl Into<String>,
        publishable_key: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            tokens,
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    async fn bearer(&self) -> CollaboratorResult<String> {
        self.tokens
            .access_token()
            .await?
            .ok_or(CollaboratorError::NotAuthenticated)
    }

    async fn check(
        response: reqwest::Response,
        what: &str,
    ) -> CollaboratorResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        tracing::error!(status = %status, body_summary = %body_summary, "Failed to {}", what);
        Err(CollaboratorError::Rejected {
            status: status.as_u16(),
            body_summary,
        })
    }

    /// `GET` for one row of `table` whose `column` equals `user_id`. The
    /// filter goes through query encoding, so ids cannot inject operators.
    fn row_lookup(
        &self,
        table: &str,
        column: &str,
        user_id: &str,
        token: &str,
    ) -> CollaboratorResult<reqwest::Request> {
        let filter = format!("eq.{}", user_id);
        let request = self
            .http_client
            .get(self.rest_url(table))
            .query(&[(column, filter.as_str()), ("select", column), ("limit", "1")])
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .build()?;
        Ok(request)
    }

    async fn row_exists(
        &self,
        table: &str,
        column: &str,
        user_id: &str,
    ) -> CollaboratorResult<bool> {
        let token = self.bearer().await?;
        let request = self.row_lookup(table, column, user_id, &token)?;
        let response = self.http_client.execute(request).await?;
        let rows: Vec<Value> = Self::check(response, "check backing rows")
            .await?
            .json()
            .await?;
        debug!(table, found = !rows.is_empty(), "Backing row lookup");
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl BackingDataVerifier for SupabaseBackingData {
    async fn has_backing_data(&self, user_id: &str) -> CollaboratorResult<bool> {
        if !self.row_exists("profiles", "id", user_id).await? {
            return Ok(false);
        }
        self.row_exists("usage_limits", "user_id", user_id).await
    }
}

#[async_trait]
impl BackingDataInitializer for SupabaseBackingData {
    async fn initialize_backing_data(&self, user_id: &str) -> CollaboratorResult<()> {
        let token = self.bearer().await?;
        let response = self
            .http_client
            .post(self.rest_url("rpc/initialize_user_data"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", token))
            .json(&json!({ "p_user_id": user_id }))
            .send()
            .await?;
        Self::check(response, "initialize user data").await?;
        debug!(user_id, "initialize_user_data completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_engine::StaticAccessToken;

    #[test]
    fn test_rest_url() {
        let data = SupabaseBackingData::new(
            "https://x.supabase.co/",
            "key",
            Arc::new(StaticAccessToken::default()),
        );
        assert_eq!(
            data.rest_url("rpc/initialize_user_data"),
            "https://x.supabase.co/rest/v1/rpc/initialize_user_data"
        );
    }

    #[test]
    fn test_row_lookup_encodes_user_id() {
        let data = SupabaseBackingData::new(
            "https://x.supabase.co",
            "key",
            Arc::new(StaticAccessToken::default()),
        );
        let request = data
            .row_lookup("profiles", "id", "a&or=(id.neq.x) b", "token")
            .unwrap();

        let url = request.url();
        assert_eq!(url.path(), "/rest/v1/profiles");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "eq.a&or=(id.neq.x) b".to_string()),
                ("select".to_string(), "id".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Bearer token"
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_an_error_not_missing_data() {
        let data = SupabaseBackingData::new(
            "https://x.supabase.co",
            "key",
            Arc::new(StaticAccessToken(None)),
        );
        assert!(matches!(
            data.has_backing_data("u-1").await,
            Err(CollaboratorError::NotAuthenticated)
        ));
        assert!(matches!(
            data.initialize_backing_data("u-1").await,
            Err(CollaboratorError::NotAuthenticated)
        ));
    }
}
