use crate::{
    compute_intent, NavigationError, NavigationIntent, NavigationResult, NavigationRuntime,
    NavigationState, RouteNames,
};
use app_config_and_utils::{Config, RetryPolicy};
use diagnostics_sink::{DiagnosticKind, DiagnosticsSink};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timing and route configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Quiet period that collapses bursts of requests.
    pub debounce: Duration,
    /// Readiness retry schedule.
    pub retry: RetryPolicy,
    pub routes: RouteNames,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            retry: RetryPolicy::navigation_readiness(),
            routes: RouteNames::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.navigation_debounce(),
            retry: config.navigation_retry.clone(),
            routes: RouteNames::default(),
        }
    }
}

/// How one reconciliation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Navigated { target: NavigationIntent },
    AlreadyThere { target: NavigationIntent },
    /// The runtime never became ready within the retry bound.
    GaveUp { target: NavigationIntent, attempts: u32 },
    Failed { target: NavigationIntent, error: String },
}

impl ReconcileOutcome {
    pub fn target(&self) -> NavigationIntent {
        match self {
            ReconcileOutcome::Navigated { target }
            | ReconcileOutcome::AlreadyThere { target }
            | ReconcileOutcome::GaveUp { target, .. }
            | ReconcileOutcome::Failed { target, .. } => *target,
        }
    }
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    pub requests: u64,
    pub reconciliations: u64,
    pub readiness_checks: u64,
    pub commands: u64,
    pub gave_up: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    reconciliations: AtomicU64,
    readiness_checks: AtomicU64,
    commands: AtomicU64,
    gave_up: AtomicU64,
}

struct Shared {
    config: ReconcilerConfig,
    runtime: RwLock<Option<Arc<dyn NavigationRuntime>>>,
    mounted: AtomicBool,
    reset_flow_active: AtomicBool,
    counters: Counters,
    outcome_tx: watch::Sender<Option<ReconcileOutcome>>,
    diagnostics: DiagnosticsSink,
}

/// Debounced, serialized navigation driver.
///
/// Requests only record the latest `is_authenticated` value; one worker task
/// waits for a quiet period, then reconciles. While waiting for the runtime
/// to become ready, newer requests replace the inputs of the running
/// reconciliation instead of starting another one.
pub struct NavigationReconciler {
    shared: Arc<Shared>,
    request_tx: watch::Sender<Option<bool>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NavigationReconciler {
    /// Spawn the worker on the current tokio runtime.
    pub fn new(config: ReconcilerConfig, diagnostics: DiagnosticsSink) -> NavigationResult<Self> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| NavigationError::NoAsyncRuntime)?;

        let (request_tx, request_rx) = watch::channel(None);
        let (outcome_tx, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            config,
            runtime: RwLock::new(None),
            mounted: AtomicBool::new(false),
            reset_flow_active: AtomicBool::new(false),
            counters: Counters::default(),
            outcome_tx,
            diagnostics,
        });
        let worker = handle.spawn(run_worker(shared.clone(), request_rx));

        Ok(Self {
            shared,
            request_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn attach_runtime(&self, runtime: Arc<dyn NavigationRuntime>) {
        *self.shared.runtime.write() = Some(runtime);
        debug!("Navigation runtime attached");
    }

    pub fn detach_runtime(&self) {
        *self.shared.runtime.write() = None;
        self.shared.mounted.store(false, Ordering::SeqCst);
        debug!("Navigation runtime detached");
    }

    /// Host mount flag. Necessary for readiness, not sufficient.
    pub fn mark_ready(&self, mounted: bool) {
        self.shared.mounted.store(mounted, Ordering::SeqCst);
    }

    /// While active, the target is always the auth stack. Toggling re-runs
    /// the last request.
    pub fn set_reset_password_flow_active(&self, active: bool) {
        let previous = self.shared.reset_flow_active.swap(active, Ordering::SeqCst);
        if previous == active {
            return;
        }
        info!(active, "Password reset flow toggled");
        let last_request = *self.request_tx.borrow();
        if let Some(is_authenticated) = last_request {
            self.navigate_by_auth_state(is_authenticated);
        }
    }

    pub fn is_reset_password_flow_active(&self) -> bool {
        self.shared.reset_flow_active.load(Ordering::SeqCst)
    }

    /// Request navigation for the given auth state. Returns immediately.
    pub fn navigate_by_auth_state(&self, is_authenticated: bool) {
        self.shared.counters.requests.fetch_add(1, Ordering::Relaxed);
        debug!(is_authenticated, "Navigation requested");
        self.request_tx.send_replace(Some(is_authenticated));
    }

    /// Receiver of the latest reconciliation outcome.
    pub fn outcomes(&self) -> watch::Receiver<Option<ReconcileOutcome>> {
        self.shared.outcome_tx.subscribe()
    }

    pub fn last_outcome(&self) -> Option<ReconcileOutcome> {
        self.shared.outcome_tx.borrow().clone()
    }

    pub fn stats(&self) -> ReconcilerStats {
        let counters = &self.shared.counters;
        ReconcilerStats {
            requests: counters.requests.load(Ordering::Relaxed),
            reconciliations: counters.reconciliations.load(Ordering::Relaxed),
            readiness_checks: counters.readiness_checks.load(Ordering::Relaxed),
            commands: counters.commands.load(Ordering::Relaxed),
            gave_up: counters.gave_up.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker. Pending requests are dropped.
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
            debug!("Navigation reconciler stopped");
        }
    }
}

impl Drop for NavigationReconciler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(shared: Arc<Shared>, mut requests: watch::Receiver<Option<bool>>) {
    loop {
        if requests.changed().await.is_err() {
            break;
        }
        if !debounce(&shared, &mut requests).await {
            break;
        }
        let request = *requests.borrow_and_update();
        let Some(is_authenticated) = request else {
            continue;
        };
        let outcome = reconcile(&shared, &mut requests, is_authenticated).await;
        shared.outcome_tx.send_replace(Some(outcome));
    }
}

/// Wait until no request has arrived for one debounce period. Returns false
/// once the request channel is closed.
async fn debounce(shared: &Shared, requests: &mut watch::Receiver<Option<bool>>) -> bool {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(shared.config.debounce) => return true,
            changed = requests.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn reconcile(
    shared: &Shared,
    requests: &mut watch::Receiver<Option<bool>>,
    mut is_authenticated: bool,
) -> ReconcileOutcome {
    shared.counters.reconciliations.fetch_add(1, Ordering::Relaxed);
    let policy = &shared.config.retry;
    let mut attempt = 0u32;

    loop {
        let target = compute_intent(
            is_authenticated,
            shared.reset_flow_active.load(Ordering::SeqCst),
        );
        shared.counters.readiness_checks.fetch_add(1, Ordering::Relaxed);

        if let Some((runtime, state)) = shared.ready_runtime() {
            return shared.navigate(runtime.as_ref(), &state, target);
        }

        if attempt >= policy.max_retries {
            let attempts = attempt + 1;
            shared.counters.gave_up.fetch_add(1, Ordering::Relaxed);
            warn!(target = %target, attempts, "Navigation runtime not ready, giving up");
            shared.diagnostics.record(
                DiagnosticKind::NavigationFailure,
                None,
                json!({ "target": target.as_str(), "attempts": attempts, "reason": "not_ready" }),
            );
            return ReconcileOutcome::GaveUp { target, attempts };
        }

        let delay = policy.delay_for_attempt(attempt);
        debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "Navigation runtime not ready, retrying"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                changed = requests.changed() => match changed {
                    Ok(()) => {
                        if let Some(latest) = *requests.borrow_and_update() {
                            is_authenticated = latest;
                        }
                    }
                    Err(_) => {
                        (&mut sleep).await;
                        break;
                    }
                },
            }
        }
        attempt += 1;
    }
}

impl Shared {
    /// Runtime and its state, if it is attached, mounted and has routes.
    fn ready_runtime(&self) -> Option<(Arc<dyn NavigationRuntime>, NavigationState)> {
        if !self.mounted.load(Ordering::SeqCst) {
            debug!("Navigation container not mounted");
            return None;
        }
        let runtime = self.runtime.read().clone()?;
        match runtime.root_state() {
            Ok(Some(state)) if !state.routes.is_empty() => Some((runtime, state)),
            Ok(_) => {
                debug!("Navigation state has no routes yet");
                None
            }
            Err(err) => {
                debug!(error = %err, "Navigation state unavailable");
                None
            }
        }
    }

    fn navigate(
        &self,
        runtime: &dyn NavigationRuntime,
        state: &NavigationState,
        target: NavigationIntent,
    ) -> ReconcileOutcome {
        let route = self.config.routes.route_for(target);
        let current = state.current_route();
        if current == Some(route) {
            debug!(route, "Already on target route");
            return ReconcileOutcome::AlreadyThere { target };
        }

        match runtime.reset_to(route) {
            Ok(()) => {
                self.counters.commands.fetch_add(1, Ordering::Relaxed);
                info!(from = ?current, to = route, "Navigation reset");
                ReconcileOutcome::Navigated { target }
            }
            Err(err) => {
                let error = err.to_string();
                warn!(route, error = %error, "Navigation reset failed");
                self.diagnostics.record(
                    DiagnosticKind::NavigationFailure,
                    None,
                    json!({ "target": target.as_str(), "error": error }),
                );
                ReconcileOutcome::Failed { target, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeadlessNavigation;

    fn reconciler() -> (NavigationReconciler, DiagnosticsSink) {
        let diagnostics = DiagnosticsSink::log_only();
        let reconciler =
            NavigationReconciler::new(ReconcilerConfig::default(), diagnostics.clone()).unwrap();
        (reconciler, diagnostics)
    }

    fn attach(reconciler: &NavigationReconciler, runtime: &Arc<HeadlessNavigation>) {
        reconciler.attach_runtime(runtime.clone());
        reconciler.mark_ready(true);
    }

    async fn next_outcome(
        outcomes: &mut watch::Receiver<Option<ReconcileOutcome>>,
    ) -> ReconcileOutcome {
        outcomes.changed().await.unwrap();
        outcomes.borrow_and_update().clone().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_on_target_is_a_noop() {
        let (reconciler, _) = reconciler();
        let runtime = Arc::new(HeadlessNavigation::mounted_at("Main"));
        attach(&reconciler, &runtime);
        let mut outcomes = reconciler.outcomes();

        reconciler.navigate_by_auth_state(true);
        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::AlreadyThere {
                target: NavigationIntent::Main
            }
        );
        reconciler.navigate_by_auth_state(true);
        next_outcome(&mut outcomes).await;

        assert!(runtime.commands().is_empty());
        assert_eq!(reconciler.stats().commands, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_flow_wins_over_authentication() {
        let (reconciler, _) = reconciler();
        let runtime = Arc::new(HeadlessNavigation::mounted_at("Main"));
        attach(&reconciler, &runtime);
        let mut outcomes = reconciler.outcomes();

        reconciler.set_reset_password_flow_active(true);
        reconciler.navigate_by_auth_state(true);
        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::Navigated {
                target: NavigationIntent::Auth
            }
        );

        // Leaving the flow re-runs the last request.
        reconciler.set_reset_password_flow_active(false);
        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::Navigated {
                target: NavigationIntent::Main
            }
        );
        assert_eq!(runtime.commands(), vec!["Auth".to_string(), "Main".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_command() {
        let (reconciler, _) = reconciler();
        let runtime = Arc::new(HeadlessNavigation::mounted_at("Auth"));
        attach(&reconciler, &runtime);
        let mut outcomes = reconciler.outcomes();

        reconciler.navigate_by_auth_state(true);
        tokio::time::sleep(Duration::from_millis(20)).await;
        reconciler.navigate_by_auth_state(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        reconciler.navigate_by_auth_state(true);

        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::Navigated {
                target: NavigationIntent::Main
            }
        );
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(runtime.commands(), vec!["Main".to_string()]);
        let stats = reconciler.stats();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.reconciliations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_retries() {
        let (reconciler, diagnostics) = reconciler();
        let mut outcomes = reconciler.outcomes();

        reconciler.navigate_by_auth_state(true);

        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::GaveUp {
                target: NavigationIntent::Main,
                attempts: 4
            }
        );
        let stats = reconciler.stats();
        assert_eq!(stats.readiness_checks, 4);
        assert_eq!(stats.gave_up, 1);
        assert_eq!(stats.commands, 0);

        let events = diagnostics.recent();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DiagnosticKind::NavigationFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_flag_alone_is_not_ready() {
        let (reconciler, _) = reconciler();
        let runtime = Arc::new(HeadlessNavigation::mounted_at("Auth"));
        attach(&reconciler, &runtime);
        runtime.set_fail_reads(true);
        let mut outcomes = reconciler.outcomes();

        reconciler.navigate_by_auth_state(true);

        assert!(matches!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::GaveUp { .. }
        ));
        assert!(runtime.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigates_once_runtime_mounts() {
        let (reconciler, _) = reconciler();
        let runtime = Arc::new(HeadlessNavigation::new());
        attach(&reconciler, &runtime);
        let mut outcomes = reconciler.outcomes();

        reconciler.navigate_by_auth_state(true);
        // First check at 100ms fails, the retry fires at 400ms.
        tokio::time::sleep(Duration::from_millis(350)).await;
        runtime.mount("Auth");

        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::Navigated {
                target: NavigationIntent::Main
            }
        );
        assert_eq!(reconciler.stats().readiness_checks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_retry_replaces_inputs() {
        let (reconciler, _) = reconciler();
        let runtime = Arc::new(HeadlessNavigation::new());
        attach(&reconciler, &runtime);
        let mut outcomes = reconciler.outcomes();

        reconciler.navigate_by_auth_state(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
        reconciler.navigate_by_auth_state(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        runtime.mount("Main");

        assert_eq!(
            next_outcome(&mut outcomes).await,
            ReconcileOutcome::Navigated {
                target: NavigationIntent::Auth
            }
        );
        assert_eq!(runtime.commands(), vec!["Auth".to_string()]);
        assert_eq!(reconciler.stats().reconciliations, 1);
    }

    #[test]
    fn test_requires_async_runtime() {
        let result = NavigationReconciler::new(
            ReconcilerConfig::default(),
            DiagnosticsSink::log_only(),
        );
        assert!(matches!(result, Err(NavigationError::NoAsyncRuntime)));
    }
}
