use crate::{DiagnosticEvent, TransportError, TransportResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Delivers one diagnostic event to a remote collector.
#[async_trait]
pub trait DiagnosticTransport: Send + Sync {
    async fn send(&self, event: &DiagnosticEvent) -> TransportResult<()>;
}

/// Row shape of the `diagnostic_logs` table.
#[derive(Debug, Serialize)]
struct DiagnosticRow<'a> {
    event_type: &'a str,
    user_id: Option<&'a str>,
    occurred_at: i64,
    details: &'a Map<String, Value>,
    device_info: Value,
    network_info: Value,
}

/// Inserts events into Supabase through PostgREST.
#[derive(Clone)]
pub struct SupabaseDiagnosticsTransport {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
}

impl SupabaseDiagnosticsTransport {
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }
}

#[async_trait]
impl DiagnosticTransport for SupabaseDiagnosticsTransport {
    async fn send(&self, event: &DiagnosticEvent) -> TransportResult<()> {
        let row = DiagnosticRow {
            event_type: event.kind.as_str(),
            user_id: event.user_id.as_deref(),
            occurred_at: event.timestamp,
            details: &event.details,
            device_info: serde_json::to_value(&event.device).unwrap_or(Value::Null),
            network_info: serde_json::to_value(&event.network).unwrap_or(Value::Null),
        };

        let response = self
            .http_client
            .post(self.rest_url("diagnostic_logs"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", self.publishable_key))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status,
                body_summary: summarize_response_body(&body),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url_strips_trailing_slash() {
        let transport = SupabaseDiagnosticsTransport::new("https://x.supabase.co/", "key");
        assert_eq!(
            transport.rest_url("diagnostic_logs"),
            "https://x.supabase.co/rest/v1/diagnostic_logs"
        );
    }

    #[test]
    fn test_body_summary_hides_content() {
        let summary = summarize_response_body("secret error body");
        assert!(summary.starts_with("len=17,digest="));
        assert!(!summary.contains("secret"));
    }
}
