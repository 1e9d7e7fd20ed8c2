use crate::{
    DeviceInfoProvider, DiagnosticEvent, DiagnosticKind, DiagnosticTransport, StaticDeviceInfo,
    TransportError,
};
use app_config_and_utils::{ConnectivityProbe, NetworkSnapshot};
use observability::redact::sanitize_map;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

const QUEUE_CAPACITY: usize = 256;
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const RECENT_CAPACITY: usize = 32;

/// Fire-and-forget diagnostics recorder. Cheap to clone.
#[derive(Clone)]
pub struct DiagnosticsSink {
    inner: Arc<Inner>,
}

struct Inner {
    sender: Option<mpsc::Sender<DiagnosticEvent>>,
    device: Arc<dyn DeviceInfoProvider>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    recent: Mutex<VecDeque<DiagnosticEvent>>,
}

impl DiagnosticsSink {
    /// Build a sink. The delivery worker is only spawned when a transport is
    /// given and a tokio runtime is running; otherwise events are log-only.
    pub fn new(
        transport: Option<Arc<dyn DiagnosticTransport>>,
        device: Arc<dyn DeviceInfoProvider>,
        connectivity: Option<Arc<dyn ConnectivityProbe>>,
    ) -> Self {
        let sender = transport.and_then(|transport| {
            let handle = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle,
                Err(_) => {
                    debug!("No tokio runtime, diagnostics are log-only");
                    return None;
                }
            };
            let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
            handle.spawn(run_delivery_worker(receiver, transport));
            Some(sender)
        });

        Self {
            inner: Arc::new(Inner {
                sender,
                device,
                connectivity,
                recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            }),
        }
    }

    /// Sink that only logs, with device info for the current process.
    pub fn log_only() -> Self {
        Self::new(
            None,
            Arc::new(StaticDeviceInfo::current(env!("CARGO_PKG_VERSION"))),
            None,
        )
    }

    /// Capture one failure event.
    ///
    /// `details` is expected to be a JSON object; any other value is stored
    /// under a `value` key. Sensitive keys are redacted before the event is
    /// logged or queued.
    pub fn record(&self, kind: DiagnosticKind, user_id: Option<&str>, details: Value) {
        let details = match details {
            Value::Object(map) => sanitize_map(&map),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                sanitize_map(&map)
            }
        };

        let event = DiagnosticEvent {
            kind,
            user_id: user_id.map(str::to_string),
            timestamp: chrono::Utc::now().timestamp_millis(),
            details,
            device: self.inner.device.snapshot(),
            network: self.network_snapshot(),
        };

        let details_json = Value::Object(event.details.clone()).to_string();
        if kind.is_low_severity() {
            warn!(
                event_code = kind.as_str(),
                user_id = ?event.user_id,
                is_online = event.network.is_online,
                details = %details_json,
                "Diagnostic recorded"
            );
        } else {
            error!(
                event_code = kind.as_str(),
                user_id = ?event.user_id,
                is_online = event.network.is_online,
                details = %details_json,
                "Diagnostic recorded"
            );
        }

        {
            let mut recent = self.inner.recent.lock();
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        if let Some(sender) = &self.inner.sender {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(event_code = kind.as_str(), "Diagnostics queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Most recent events, oldest first.
    pub fn recent(&self) -> Vec<DiagnosticEvent> {
        self.inner.recent.lock().iter().cloned().collect()
    }

    /// Whether events are shipped to a remote collector.
    pub fn is_log_only(&self) -> bool {
        self.inner.sender.is_none()
    }

    fn network_snapshot(&self) -> NetworkSnapshot {
        match &self.inner.connectivity {
            Some(probe) => probe.snapshot(),
            None => NetworkSnapshot {
                is_online: true,
                connection_type: None,
            },
        }
    }
}

impl std::fmt::Debug for DiagnosticsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsSink")
            .field("log_only", &self.is_log_only())
            .finish()
    }
}

async fn run_delivery_worker(
    mut receiver: mpsc::Receiver<DiagnosticEvent>,
    transport: Arc<dyn DiagnosticTransport>,
) {
    while let Some(event) = receiver.recv().await {
        let outcome = match tokio::time::timeout(DELIVERY_TIMEOUT, transport.send(&event)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        if let Err(err) = outcome {
            debug!(
                event_code = event.kind.as_str(),
                error = %err,
                "Diagnostic delivery failed"
            );
        }
    }
    debug!("Diagnostics delivery worker stopped");
}
