//! Verify-then-initialize orchestration.

use crate::init_fsm::{InitMachine, InitMachineInput};
use crate::{
    BackingDataInitializer, BackingDataVerifier, CollaboratorError, CollaboratorResult,
    InitializationAttemptRecord, InitializationStatus, StatusStore,
};
use app_config_and_utils::ConnectivityProbe;
use diagnostics_sink::{DiagnosticKind, DiagnosticsSink};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const OFFLINE_MESSAGE: &str = "offline";
const INTERRUPTED_MESSAGE: &str = "interrupted";
const MISSING_USER_MESSAGE: &str = "missing user id";

/// Result of one verify/initialize call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Succeeded,
    Failed { error: String },
    /// Skipped because the device is offline; status is `requires_retry`.
    Offline,
}

impl InitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InitOutcome::Succeeded)
    }
}

/// Point-in-time view for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitSnapshot {
    pub status: InitializationStatus,
    pub error: Option<String>,
    pub is_initialized: bool,
    pub is_initializing: bool,
    pub has_init_failed: bool,
    pub requires_retry: bool,
}

struct Inner {
    fsm: InitMachine,
    error: Option<String>,
    /// Generation of the newest started attempt.
    attempt: u64,
    /// Last persistence stamp handed out.
    sequence: u64,
}

/// Single writer of [`InitializationStatus`].
///
/// Every call starts a new attempt. Transitions from an attempt that has
/// been superseded are ignored, so the newest attempt's outcome wins.
pub struct InitStateMachine {
    verifier: Arc<dyn BackingDataVerifier>,
    initializer: Arc<dyn BackingDataInitializer>,
    store: StatusStore,
    diagnostics: DiagnosticsSink,
    connectivity: Arc<dyn ConnectivityProbe>,
    collaborator_timeout: Duration,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<InitializationStatus>,
}

impl InitStateMachine {
    pub fn new(
        verifier: Arc<dyn BackingDataVerifier>,
        initializer: Arc<dyn BackingDataInitializer>,
        store: StatusStore,
        diagnostics: DiagnosticsSink,
        connectivity: Arc<dyn ConnectivityProbe>,
        collaborator_timeout: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(InitializationStatus::Unknown);
        Self {
            verifier,
            initializer,
            store,
            diagnostics,
            connectivity,
            collaborator_timeout,
            inner: Mutex::new(Inner {
                fsm: InitMachine::new(),
                error: None,
                attempt: 0,
                sequence: 0,
            }),
            status_tx,
        }
    }

    /// Seed in-memory state from the persisted record. Call once at start,
    /// before any attempt.
    ///
    /// A record left `in_progress` by a killed process is restored as
    /// `requires_retry`.
    pub async fn restore(&self) -> InitializationStatus {
        let Some(record) = self.store.load().await else {
            return self.status();
        };

        let (status, error) = match record.status {
            InitializationStatus::InProgress => (
                InitializationStatus::RequiresRetry,
                Some(INTERRUPTED_MESSAGE.to_string()),
            ),
            status => (status, record.error),
        };

        let mut inner = self.inner.lock();
        // Loading raised the store's last applied sequence; later writes must
        // be stamped above it.
        inner.sequence = inner.sequence.max(record.sequence);
        if inner.attempt != 0 {
            debug!("Attempt already started, ignoring persisted record");
            return InitializationStatus::from(inner.fsm.state());
        }
        inner.fsm = InitMachine::from_state(status.into());
        inner.error = error;
        self.status_tx.send_replace(status);
        info!(status = %status, "Initialization status restored");
        status
    }

    /// Verify the user's backing data, initializing it only when
    /// verification reports it missing.
    pub async fn verify_and_initialize(&self, user_id: &str) -> InitOutcome {
        if let Some(outcome) = self.reject_empty_user(user_id) {
            return outcome;
        }
        let attempt = self.begin_attempt();

        if !self.connectivity.is_online() {
            return self.go_offline(attempt, user_id, "verify").await;
        }

        info!(user_id = %user_id, attempt, "Verifying backing data");
        match self
            .with_timeout(self.verifier.has_backing_data(user_id))
            .await
        {
            Ok(true) => {
                self.transition(attempt, InitMachineInput::DataVerified, None)
                    .await;
                info!(user_id = %user_id, "Backing data verified");
                InitOutcome::Succeeded
            }
            Ok(false) => {
                info!(user_id = %user_id, "Backing data missing, initializing");
                self.run_initialize(attempt, user_id).await
            }
            Err(err) => {
                // No blind repair: an unanswered verification is a failure.
                let error = err.to_string();
                self.transition(attempt, InitMachineInput::AttemptFailed, Some(error.clone()))
                    .await;
                self.diagnostics.record(
                    DiagnosticKind::VerifyFailure,
                    Some(user_id),
                    json!({ "stage": "verify", "error": error }),
                );
                InitOutcome::Failed { error }
            }
        }
    }

    /// Create or repair the user's backing data.
    pub async fn initialize(&self, user_id: &str) -> InitOutcome {
        if let Some(outcome) = self.reject_empty_user(user_id) {
            return outcome;
        }
        let attempt = self.begin_attempt();
        self.run_initialize(attempt, user_id).await
    }

    /// Back to `unknown`, in memory and on disk. In-flight attempts become
    /// stale.
    pub async fn reset_init_status(&self) {
        let sequence = {
            let mut inner = self.inner.lock();
            inner.attempt += 1;
            if inner.fsm.consume(&InitMachineInput::Reset).is_err() {
                inner.fsm = InitMachine::new();
            }
            inner.error = None;
            inner.sequence += 1;
            self.status_tx.send_replace(InitializationStatus::Unknown);
            inner.sequence
        };
        self.store.clear(sequence).await;
        info!("Initialization status reset");
    }

    pub fn status(&self) -> InitializationStatus {
        InitializationStatus::from(self.inner.lock().fsm.state())
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.status() == InitializationStatus::Success
    }

    pub fn is_initializing(&self) -> bool {
        self.status() == InitializationStatus::InProgress
    }

    /// True for `failed` only; `requires_retry` is reported separately.
    pub fn has_init_failed(&self) -> bool {
        self.status() == InitializationStatus::Failed
    }

    pub fn requires_retry(&self) -> bool {
        self.status() == InitializationStatus::RequiresRetry
    }

    pub fn snapshot(&self) -> InitSnapshot {
        let inner = self.inner.lock();
        let status = InitializationStatus::from(inner.fsm.state());
        InitSnapshot {
            status,
            error: inner.error.clone(),
            is_initialized: status == InitializationStatus::Success,
            is_initializing: status == InitializationStatus::InProgress,
            has_init_failed: status == InitializationStatus::Failed,
            requires_retry: status == InitializationStatus::RequiresRetry,
        }
    }

    /// Receiver that always holds the current status.
    pub fn watch_status(&self) -> watch::Receiver<InitializationStatus> {
        self.status_tx.subscribe()
    }

    fn reject_empty_user(&self, user_id: &str) -> Option<InitOutcome> {
        if !user_id.trim().is_empty() {
            return None;
        }
        warn!("Initialization requested without a user id");
        self.diagnostics.record(
            DiagnosticKind::InitFailure,
            None,
            json!({ "error": MISSING_USER_MESSAGE }),
        );
        Some(InitOutcome::Failed {
            error: MISSING_USER_MESSAGE.to_string(),
        })
    }

    fn begin_attempt(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.attempt += 1;
        inner.attempt
    }

    async fn run_initialize(&self, attempt: u64, user_id: &str) -> InitOutcome {
        if !self.connectivity.is_online() {
            return self.go_offline(attempt, user_id, "initialize").await;
        }

        self.transition(attempt, InitMachineInput::StartAttempt, None)
            .await;
        info!(user_id = %user_id, attempt, "Initializing backing data");

        match self
            .with_timeout(self.initializer.initialize_backing_data(user_id))
            .await
        {
            Ok(()) => {
                self.transition(attempt, InitMachineInput::AttemptSucceeded, None)
                    .await;
                info!(user_id = %user_id, "Backing data initialized");
                InitOutcome::Succeeded
            }
            Err(err) => {
                let error = err.to_string();
                self.transition(attempt, InitMachineInput::AttemptFailed, Some(error.clone()))
                    .await;
                self.diagnostics.record(
                    DiagnosticKind::InitFailure,
                    Some(user_id),
                    json!({ "stage": "initialize", "error": error }),
                );
                InitOutcome::Failed { error }
            }
        }
    }

    async fn go_offline(&self, attempt: u64, user_id: &str, stage: &str) -> InitOutcome {
        self.transition(
            attempt,
            InitMachineInput::WentOffline,
            Some(OFFLINE_MESSAGE.to_string()),
        )
        .await;
        self.diagnostics.record(
            DiagnosticKind::NetworkIssue,
            Some(user_id),
            json!({ "stage": stage, "error": OFFLINE_MESSAGE }),
        );
        InitOutcome::Offline
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = CollaboratorResult<T>>,
    ) -> CollaboratorResult<T> {
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(
                self.collaborator_timeout.as_millis() as u64,
            )),
        }
    }

    /// Apply `input` for `attempt` and persist the result. Superseded
    /// attempts and impossible transitions change nothing.
    async fn transition(&self, attempt: u64, input: InitMachineInput, error: Option<String>) {
        let record = {
            let mut inner = self.inner.lock();
            if inner.attempt != attempt {
                debug!(
                    attempt,
                    current = inner.attempt,
                    input = ?input,
                    "Ignoring transition from superseded attempt"
                );
                return;
            }

            let old_status = InitializationStatus::from(inner.fsm.state());
            if inner.fsm.consume(&input).is_err() {
                warn!(input = ?input, status = %old_status, "Invalid initialization transition");
                return;
            }
            let new_status = InitializationStatus::from(inner.fsm.state());
            inner.error = error;
            inner.sequence += 1;

            debug!(
                old_status = %old_status,
                new_status = %new_status,
                "Initialization state transition"
            );
            self.status_tx.send_replace(new_status);
            InitializationAttemptRecord::new(new_status, inner.error.clone(), inner.sequence)
        };

        self.store.save(&record).await;
    }
}
