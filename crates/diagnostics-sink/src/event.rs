use app_config_and_utils::NetworkSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    InitFailure,
    VerifyFailure,
    AuthFailure,
    NetworkIssue,
    ApiError,
    /// Navigation container never became ready within the retry budget.
    NavigationFailure,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::InitFailure => "init_failure",
            DiagnosticKind::VerifyFailure => "verify_failure",
            DiagnosticKind::AuthFailure => "auth_failure",
            DiagnosticKind::NetworkIssue => "network_issue",
            DiagnosticKind::ApiError => "api_error",
            DiagnosticKind::NavigationFailure => "navigation_failure",
        }
    }

    /// Offline and reachability problems are expected on mobile.
    pub fn is_low_severity(&self) -> bool {
        matches!(self, DiagnosticKind::NetworkIssue)
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of the device the client runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub platform: String,
    pub os_family: String,
    pub app_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One captured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    pub user_id: Option<String>,
    /// Epoch millis.
    pub timestamp: i64,
    pub details: Map<String, Value>,
    pub device: DeviceSnapshot,
    pub network: NetworkSnapshot,
}

/// Source of the device snapshot. Implementations must answer from local
/// state without I/O.
pub trait DeviceInfoProvider: Send + Sync {
    fn snapshot(&self) -> DeviceSnapshot;
}

/// Device info fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    snapshot: DeviceSnapshot,
}

impl StaticDeviceInfo {
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        Self { snapshot }
    }

    /// Describe the current process using compile-time target info.
    pub fn current(app_version: impl Into<String>) -> Self {
        Self::new(DeviceSnapshot {
            platform: std::env::consts::OS.to_string(),
            os_family: std::env::consts::FAMILY.to_string(),
            app_version: app_version.into(),
            model: None,
        })
    }
}

impl DeviceInfoProvider for StaticDeviceInfo {
    fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.clone()
    }
}
