//! Subscription entitlements.
//!
//! [`EntitlementsProvider`] is the narrow contract the app consumes;
//! [`RevenueCatClient`] implements it over the RevenueCat REST API.

mod entitlements;
mod revenuecat;

pub use entitlements::{EntitlementInfo, EntitlementSnapshot};
pub use revenuecat::{RevenueCatClient, DEFAULT_REVENUECAT_API_URL};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Billing API rejected request: {status} ({body_summary})")]
    Rejected { status: u16, body_summary: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Billing is not configured")]
    NotConfigured,

    #[error("Invalid app user id")]
    InvalidUserId,
}

pub type BillingResult<T> = Result<T, BillingError>;

#[async_trait]
pub trait EntitlementsProvider: Send + Sync {
    /// Fetch the entitlements of `user_id` and remember them as current.
    async fn get_entitlements(&self, user_id: &str) -> BillingResult<EntitlementSnapshot>;

    /// Refresh the current user's entitlements after the app returns to the
    /// foreground. `None` when no user has been fetched yet.
    async fn sync_on_resume(&self) -> BillingResult<Option<EntitlementSnapshot>>;
}
