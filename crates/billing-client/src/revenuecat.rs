//! RevenueCat REST client.

use crate::{
    BillingError, BillingResult, EntitlementInfo, EntitlementSnapshot, EntitlementsProvider,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::{debug, error, info};
use url::Url;

pub const DEFAULT_REVENUECAT_API_URL: &str = "https://api.revenuecat.com/v1";

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

#[derive(Debug, Deserialize)]
struct SubscriberResponse {
    subscriber: Subscriber,
}

#[derive(Debug, Deserialize)]
struct Subscriber {
    #[serde(default)]
    entitlements: HashMap<String, RawEntitlement>,
}

#[derive(Debug, Deserialize)]
struct RawEntitlement {
    expires_date: Option<DateTime<Utc>>,
    product_identifier: Option<String>,
}

/// Reads subscriber entitlements and caches the last snapshot.
pub struct RevenueCatClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    cache: Mutex<Option<EntitlementSnapshot>>,
}

impl RevenueCatClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api_url(DEFAULT_REVENUECAT_API_URL, api_key)
    }

    pub fn with_api_url(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            cache: Mutex::new(None),
        }
    }

    /// Last fetched snapshot, if any.
    pub fn cached(&self) -> Option<EntitlementSnapshot> {
        self.cache.lock().clone()
    }

    /// Forget the cached user, e.g. on sign-out.
    pub fn clear_cache(&self) {
        *self.cache.lock() = None;
    }

    fn subscriber_url(&self, user_id: &str) -> BillingResult<Url> {
        if user_id.trim().is_empty() {
            return Err(BillingError::InvalidUserId);
        }
        let mut url = Url::parse(&self.api_url)?;
        url.path_segments_mut()
            .map_err(|_| BillingError::NotConfigured)?
            .pop_if_empty()
            .push("subscribers")
            .push(user_id);
        Ok(url)
    }

    async fn fetch(&self, user_id: &str) -> BillingResult<EntitlementSnapshot> {
        if self.api_key.is_empty() {
            return Err(BillingError::NotConfigured);
        }
        let url = self.subscriber_url(user_id)?;
        let response = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            error!(status = %status, body_summary = %body_summary, "Failed to fetch subscriber");
            return Err(BillingError::Rejected {
                status: status.as_u16(),
                body_summary,
            });
        }

        let body = response.text().await?;
        let snapshot = parse_subscriber(user_id, &body, Utc::now())?;
        debug!(
            user_id,
            active = ?snapshot.active_identifiers(),
            "Entitlements fetched"
        );
        Ok(snapshot)
    }
}

fn parse_subscriber(
    user_id: &str,
    body: &str,
    now: DateTime<Utc>,
) -> BillingResult<EntitlementSnapshot> {
    let response: SubscriberResponse = serde_json::from_str(body)?;
    let mut entitlements: Vec<EntitlementInfo> = response
        .subscriber
        .entitlements
        .into_iter()
        .map(|(identifier, raw)| EntitlementInfo {
            identifier,
            product_identifier: raw.product_identifier,
            expires_at: raw.expires_date,
            is_active: EntitlementInfo::active_at(raw.expires_date, now),
        })
        .collect();
    entitlements.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    Ok(EntitlementSnapshot {
        user_id: user_id.to_string(),
        entitlements,
        fetched_at: now,
    })
}

#[async_trait]
impl EntitlementsProvider for RevenueCatClient {
    async fn get_entitlements(&self, user_id: &str) -> BillingResult<EntitlementSnapshot> {
        let snapshot = self.fetch(user_id).await?;
        *self.cache.lock() = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn sync_on_resume(&self) -> BillingResult<Option<EntitlementSnapshot>> {
        let Some(user_id) = self.cache.lock().as_ref().map(|s| s.user_id.clone()) else {
            debug!("No identified billing user, skipping resume sync");
            return Ok(None);
        };
        let snapshot = self.get_entitlements(&user_id).await?;
        info!(user_id = %user_id, "Entitlements synced on resume");
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "request_date": "2026-01-01T00:00:00Z",
        "subscriber": {
            "original_app_user_id": "u-1",
            "entitlements": {
                "pro": {
                    "expires_date": "2030-01-01T00:00:00Z",
                    "product_identifier": "parlo_pro_monthly",
                    "purchase_date": "2025-12-01T00:00:00Z"
                },
                "lifetime": {
                    "expires_date": null,
                    "product_identifier": "parlo_lifetime"
                },
                "trial": {
                    "expires_date": "2020-01-01T00:00:00Z",
                    "product_identifier": "parlo_trial"
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_subscriber() {
        let now = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let snapshot = parse_subscriber("u-1", BODY, now).unwrap();

        assert_eq!(snapshot.user_id, "u-1");
        assert_eq!(snapshot.entitlements.len(), 3);
        assert!(snapshot.is_active("pro"));
        assert!(snapshot.is_active("lifetime"));
        assert!(!snapshot.is_active("trial"));
        assert_eq!(snapshot.active_identifiers(), vec!["lifetime", "pro"]);
    }

    #[test]
    fn test_subscriber_without_entitlements() {
        let snapshot =
            parse_subscriber("u-2", r#"{"subscriber":{}}"#, Utc::now()).unwrap();
        assert!(!snapshot.has_any_active());
    }

    #[test]
    fn test_subscriber_url_encodes_user_id() {
        let client = RevenueCatClient::new("key");
        assert_eq!(
            client.subscriber_url("user/1 a").unwrap().as_str(),
            "https://api.revenuecat.com/v1/subscribers/user%2F1%20a"
        );
        assert!(matches!(
            client.subscriber_url(""),
            Err(BillingError::InvalidUserId)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let client = RevenueCatClient::new("");
        assert!(matches!(
            client.get_entitlements("u-1").await,
            Err(BillingError::NotConfigured)
        ));
        assert!(client.cached().is_none());
    }

    #[tokio::test]
    async fn test_resume_without_user_is_noop() {
        let client = RevenueCatClient::new("key");
        assert!(client.sync_on_resume().await.unwrap().is_none());
    }
}
