use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementInfo {
    pub identifier: String,
    pub product_identifier: Option<String>,
    /// `None` for lifetime entitlements.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl EntitlementInfo {
    /// Active when there is no expiry or the expiry lies after `now`.
    pub fn active_at(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        expires_at.map_or(true, |expires| expires > now)
    }
}

/// Entitlements of one user at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub user_id: String,
    pub entitlements: Vec<EntitlementInfo>,
    pub fetched_at: DateTime<Utc>,
}

impl EntitlementSnapshot {
    pub fn is_active(&self, identifier: &str) -> bool {
        self.entitlements
            .iter()
            .any(|entitlement| entitlement.identifier == identifier && entitlement.is_active)
    }

    pub fn has_any_active(&self) -> bool {
        self.entitlements.iter().any(|entitlement| entitlement.is_active)
    }

    pub fn active_identifiers(&self) -> Vec<&str> {
        self.entitlements
            .iter()
            .filter(|entitlement| entitlement.is_active)
            .map(|entitlement| entitlement.identifier.as_str())
            .collect()
    }
}
