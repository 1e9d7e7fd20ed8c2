//! Best-effort capture of client failure events.
//!
//! [`DiagnosticsSink::record`] never fails and never waits on the network:
//! the event is logged through `tracing`, kept in a small in-memory ring, and
//! queued for a background worker that delivers it through a
//! [`DiagnosticTransport`]. Without a transport (or a tokio runtime) the sink
//! is log-only.

mod event;
mod sink;
mod transport;

pub use event::{
    DeviceInfoProvider, DeviceSnapshot, DiagnosticEvent, DiagnosticKind, StaticDeviceInfo,
};
pub use sink::DiagnosticsSink;
pub use transport::{DiagnosticTransport, SupabaseDiagnosticsTransport};

use thiserror::Error;

/// Errors raised by a transport while delivering one event.
///
/// These never reach the code that called [`DiagnosticsSink::record`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rejected by backend: {status} ({body_summary})")]
    Rejected { status: u16, body_summary: String },

    #[error("Delivery timed out")]
    Timeout,
}

pub type TransportResult<T> = Result<T, TransportError>;
