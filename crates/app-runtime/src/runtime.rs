//! Runtime construction and the UI-facing surface.

use crate::pipeline::{Pipeline, UserSettled};
use crate::{RuntimeError, RuntimeResult};
use app_config_and_utils::{Config, ConnectivityProbe, ConnectivitySignal, Paths};
use app_storage::{JsonFileStore, LocalStore};
use auth_engine::{
    AuthError, AuthErrorKind, AuthSubscription, Identity, IdentityProvider, SessionObserver,
    SignUpOutcome, SignUpProfile, SupabaseIdentityProvider, UserUpdate,
};
use auth_nav_reconciler::{
    NavigationReconciler, NavigationRuntime, ReconcileOutcome, ReconcilerConfig,
};
use billing_client::{EntitlementSnapshot, EntitlementsProvider, RevenueCatClient};
use diagnostics_sink::{
    DiagnosticKind, DiagnosticTransport, DiagnosticsSink, StaticDeviceInfo,
    SupabaseDiagnosticsTransport,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tutor_api_client::TutorClient;
use user_init_lifecycle::{
    BackingDataInitializer, BackingDataVerifier, InitOutcome, InitSnapshot, InitStateMachine,
    InitializationStatus, StatusStore, SupabaseBackingData,
};

/// Collaborators a runtime is assembled from.
pub struct RuntimeParts {
    pub provider: Arc<dyn IdentityProvider>,
    pub verifier: Arc<dyn BackingDataVerifier>,
    pub initializer: Arc<dyn BackingDataInitializer>,
    pub store: LocalStore,
    pub diagnostics: DiagnosticsSink,
    pub connectivity: Arc<ConnectivitySignal>,
    pub collaborator_timeout: Duration,
    pub navigation: ReconcilerConfig,
    pub entitlements: Option<Arc<dyn EntitlementsProvider>>,
    pub tutor: Option<TutorClient>,
}

/// Everything the UI renders from, in one value.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub user: Option<Identity>,
    pub initialization: InitSnapshot,
    pub navigation: Option<ReconcileOutcome>,
    pub reset_password_flow_active: bool,
    pub is_online: bool,
}

#[derive(Default)]
struct Tasks {
    subscription: Option<AuthSubscription>,
    pipeline: Option<JoinHandle<()>>,
}

pub struct AppAuthRuntime {
    provider: Arc<dyn IdentityProvider>,
    observer: Arc<SessionObserver>,
    init: Arc<InitStateMachine>,
    navigation: Arc<NavigationReconciler>,
    store: LocalStore,
    diagnostics: DiagnosticsSink,
    connectivity: Arc<ConnectivitySignal>,
    entitlements: Option<Arc<dyn EntitlementsProvider>>,
    tutor: Option<TutorClient>,
    settled: Arc<watch::Sender<Option<UserSettled>>>,
    started: AtomicBool,
    tasks: Mutex<Tasks>,
}

impl AppAuthRuntime {
    /// Assemble from explicit parts. Requires a running tokio runtime.
    pub fn new(parts: RuntimeParts) -> RuntimeResult<Self> {
        let navigation = Arc::new(NavigationReconciler::new(
            parts.navigation,
            parts.diagnostics.clone(),
        )?);
        let init = Arc::new(InitStateMachine::new(
            parts.verifier,
            parts.initializer,
            StatusStore::new(parts.store.clone()),
            parts.diagnostics.clone(),
            parts.connectivity.clone(),
            parts.collaborator_timeout,
        ));

        Ok(Self {
            observer: Arc::new(SessionObserver::new(parts.provider.clone())),
            provider: parts.provider,
            init,
            navigation,
            store: parts.store,
            diagnostics: parts.diagnostics,
            connectivity: parts.connectivity,
            entitlements: parts.entitlements,
            tutor: parts.tutor,
            settled: Arc::new(watch::channel(None).0),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Tasks::default()),
        })
    }

    /// Production wiring: Supabase auth, PostgREST backing data, file-backed
    /// local store, RevenueCat when a key is configured.
    pub fn from_config(config: &Config, paths: &Paths) -> RuntimeResult<Self> {
        paths.ensure_dirs()?;
        let store = LocalStore::new(Arc::new(JsonFileStore::new(paths.store_file())));
        let supabase_url = config.supabase_url()?;
        let supabase_url = supabase_url.as_str();

        let provider = Arc::new(SupabaseIdentityProvider::new(
            supabase_url,
            &config.supabase_publishable_key,
            store.clone(),
        ));
        let backing = Arc::new(SupabaseBackingData::new(
            supabase_url,
            config.supabase_publishable_key.clone(),
            provider.clone(),
        ));

        let connectivity = Arc::new(ConnectivitySignal::new(true));
        let transport = config.diagnostics_enabled.then(|| {
            Arc::new(SupabaseDiagnosticsTransport::new(
                supabase_url,
                config.supabase_publishable_key.clone(),
            )) as Arc<dyn DiagnosticTransport>
        });
        let diagnostics = DiagnosticsSink::new(
            transport,
            Arc::new(StaticDeviceInfo::current(config.app_version.clone())),
            Some(connectivity.clone() as Arc<dyn ConnectivityProbe>),
        );

        let entitlements = config
            .revenuecat_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(|key| Arc::new(RevenueCatClient::new(key)) as Arc<dyn EntitlementsProvider>);
        let tutor = TutorClient::new(config.tutor_api_url()?, provider.clone());

        Self::new(RuntimeParts {
            provider,
            verifier: backing.clone(),
            initializer: backing,
            store,
            diagnostics,
            connectivity,
            collaborator_timeout: config.collaborator_timeout(),
            navigation: ReconcilerConfig::from_config(config),
            entitlements,
            tutor: Some(tutor),
        })
    }

    /// Restore the persisted status, subscribe to auth changes, start the
    /// pipeline and run the initial session query. Returns the restored
    /// user, if any.
    ///
    /// A failed session query is recorded and treated as signed out.
    pub async fn start(&self) -> RuntimeResult<Option<Identity>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }

        let restored = self.init.restore().await;
        info!(status = %restored, "Starting auth runtime");

        let (user_tx, user_rx) = mpsc::unbounded_channel();
        let subscription = self.observer.subscribe(Arc::new(move |user: Option<Identity>| {
            let _ = user_tx.send(user);
        }))?;
        let pipeline = Pipeline {
            init: self.init.clone(),
            navigation: self.navigation.clone(),
            diagnostics: self.diagnostics.clone(),
            entitlements: self.entitlements.clone(),
            settled: self.settled.clone(),
        };
        let pipeline = tokio::spawn(pipeline.run(user_rx));
        {
            let mut tasks = self.tasks.lock();
            tasks.subscription = Some(subscription);
            tasks.pipeline = Some(pipeline);
        }

        let user = match self.observer.initialize().await {
            Ok(user) => user,
            Err(err) => {
                self.record_auth_failure("initial_session", &err);
                None
            }
        };
        if user.is_none() {
            // No change event for "still signed out"; navigate explicitly.
            self.navigation.navigate_by_auth_state(false);
        }
        Ok(user)
    }

    /// Unsubscribe from auth changes and stop the pipeline and reconciler.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        if let Some(subscription) = tasks.subscription.take() {
            subscription.unsubscribe();
        }
        if let Some(pipeline) = tasks.pipeline.take() {
            pipeline.abort();
        }
        self.navigation.shutdown();
        info!("Auth runtime stopped");
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> RuntimeResult<Identity> {
        match self.provider.sign_in_with_password(email, password).await {
            Ok(identity) => {
                info!(user_id = %identity.id, "Signed in");
                Ok(identity)
            }
            Err(err) => {
                self.record_auth_failure("sign_in", &err);
                Err(err.into())
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> RuntimeResult<SignUpOutcome> {
        match self.provider.sign_up(email, password, profile).await {
            Ok(outcome) => {
                info!(
                    user_id = %outcome.identity.id,
                    confirmation_required = outcome.confirmation_required,
                    "Signed up"
                );
                Ok(outcome)
            }
            Err(err) => {
                self.record_auth_failure("sign_up", &err);
                Err(err.into())
            }
        }
    }

    /// Sign out, wipe the local store and reset initialization. Local
    /// cleanup happens even when the provider call fails.
    pub async fn sign_out(&self) -> RuntimeResult<()> {
        let result = self.provider.sign_out().await;
        if let Err(err) = &result {
            self.record_auth_failure("sign_out", err);
        }
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "Failed to clear local store on sign-out");
        }
        self.init.reset_init_status().await;
        self.navigation.navigate_by_auth_state(false);
        result.map_err(RuntimeError::from)
    }

    pub async fn resend_verification(&self, email: &str) -> RuntimeResult<()> {
        self.provider
            .resend_verification(email)
            .await
            .map_err(|err| self.auth_failure("resend_verification", err))
    }

    pub async fn reset_password_for_email(&self, email: &str) -> RuntimeResult<()> {
        self.provider
            .reset_password_for_email(email)
            .await
            .map_err(|err| self.auth_failure("reset_password_for_email", err))
    }

    pub async fn update_user(&self, update: &UserUpdate) -> RuntimeResult<Identity> {
        self.provider
            .update_user(update)
            .await
            .map_err(|err| self.auth_failure("update_user", err))
    }

    /// Re-run verify-then-initialize for the current user.
    pub async fn retry_initialization(&self) -> RuntimeResult<InitOutcome> {
        let user = self.observer.current_user().ok_or(AuthError::NotLoggedIn)?;
        let outcome = self.init.verify_and_initialize(&user.id).await;
        self.navigation.navigate_by_auth_state(true);
        Ok(outcome)
    }

    pub async fn reset_init_status(&self) {
        self.init.reset_init_status().await;
    }

    /// Refresh entitlements when the app returns to the foreground.
    pub async fn on_app_resume(&self) -> Option<EntitlementSnapshot> {
        let entitlements = self.entitlements.as_ref()?;
        match entitlements.sync_on_resume().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let user = self.observer.current_user();
                self.diagnostics.record(
                    DiagnosticKind::ApiError,
                    user.as_ref().map(|u| u.id.as_str()),
                    json!({ "service": "billing", "operation": "sync_on_resume", "error": err.to_string() }),
                );
                None
            }
        }
    }

    pub fn set_online(&self, online: bool, connection_type: Option<String>) {
        self.connectivity.set_online(online, connection_type);
    }

    pub fn set_reset_password_flow_active(&self, active: bool) {
        self.navigation.set_reset_password_flow_active(active);
    }

    pub fn attach_navigation(&self, runtime: Arc<dyn NavigationRuntime>) {
        self.navigation.attach_runtime(runtime);
    }

    pub fn set_navigation_ready(&self, ready: bool) {
        self.navigation.mark_ready(ready);
    }

    /// Debounced navigation entry point for the UI.
    pub fn navigate_by_auth_state(&self, is_authenticated: bool) {
        self.navigation.navigate_by_auth_state(is_authenticated);
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.observer.current_user()
    }

    pub fn watch_user(&self) -> watch::Receiver<Option<Identity>> {
        self.observer.watch_user()
    }

    pub fn init_status(&self) -> InitializationStatus {
        self.init.status()
    }

    pub fn watch_init_status(&self) -> watch::Receiver<InitializationStatus> {
        self.init.watch_status()
    }

    pub fn watch_navigation(&self) -> watch::Receiver<Option<ReconcileOutcome>> {
        self.navigation.outcomes()
    }

    /// Receiver for the last user the pipeline finished handling.
    pub fn watch_settled(&self) -> watch::Receiver<Option<UserSettled>> {
        self.settled.subscribe()
    }

    /// Wait until the pipeline has finished verify/initialize for
    /// `user_id`. Returns `None` if that does not happen within `limit`.
    pub async fn wait_until_settled(
        &self,
        user_id: &str,
        limit: Duration,
    ) -> Option<UserSettled> {
        let mut settled = self.settled.subscribe();
        let waited = tokio::time::timeout(
            limit,
            settled.wait_for(|s| s.as_ref().is_some_and(|s| s.user_id == user_id)),
        )
        .await;
        match waited {
            Ok(Ok(current)) => current.clone(),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_initialized()
    }

    pub fn is_initializing(&self) -> bool {
        self.init.is_initializing()
    }

    pub fn has_init_failed(&self) -> bool {
        self.init.has_init_failed()
    }

    pub fn tutor(&self) -> Option<&TutorClient> {
        self.tutor.as_ref()
    }

    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.diagnostics
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            user: self.observer.current_user(),
            initialization: self.init.snapshot(),
            navigation: self.navigation.last_outcome(),
            reset_password_flow_active: self.navigation.is_reset_password_flow_active(),
            is_online: self.connectivity.is_online(),
        }
    }

    fn auth_failure(&self, operation: &str, err: AuthError) -> RuntimeError {
        self.record_auth_failure(operation, &err);
        err.into()
    }

    fn record_auth_failure(&self, operation: &str, err: &AuthError) {
        let kind = match err.kind() {
            AuthErrorKind::Network => DiagnosticKind::NetworkIssue,
            _ => DiagnosticKind::AuthFailure,
        };
        let user = self.observer.current_user();
        self.diagnostics.record(
            kind,
            user.as_ref().map(|u| u.id.as_str()),
            json!({ "operation": operation, "kind": err.kind().as_str(), "error": err.to_string() }),
        );
    }
}

impl Drop for AppAuthRuntime {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        if let Some(pipeline) = tasks.pipeline.take() {
            pipeline.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_storage::StorageKeys;
    use async_trait::async_trait;
    use auth_engine::{AuthChangeEvent, AuthResult, Session};
    use auth_nav_reconciler::{HeadlessNavigation, NavigationIntent};
    use diagnostics_sink::DeviceInfoProvider;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::broadcast;
    use user_init_lifecycle::{CollaboratorError, CollaboratorResult};

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: Some(format!("{id}@example.com")),
            email_verified: true,
            display_name: None,
        }
    }

    struct FakeProvider {
        events: broadcast::Sender<AuthChangeEvent>,
        user: parking_lot::Mutex<Option<Identity>>,
    }

    impl FakeProvider {
        fn new(user: Option<Identity>) -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                events,
                user: parking_lot::Mutex::new(user),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_up(&self, _: &str, _: &str, _: &SignUpProfile) -> AuthResult<SignUpOutcome> {
            Err(AuthError::provider(AuthErrorKind::UserAlreadyRegistered, "exists"))
        }
        async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Identity> {
            if password != "secret" {
                return Err(AuthError::provider(
                    AuthErrorKind::InvalidCredentials,
                    "Invalid login credentials",
                ));
            }
            let user = identity(email.trim_end_matches("@example.com"));
            *self.user.lock() = Some(user.clone());
            let _ = self.events.send(AuthChangeEvent::SignedIn(user.clone()));
            Ok(user)
        }
        async fn sign_out(&self) -> AuthResult<()> {
            *self.user.lock() = None;
            let _ = self.events.send(AuthChangeEvent::SignedOut);
            Ok(())
        }
        async fn get_session(&self) -> AuthResult<Option<Session>> {
            Ok(self.user.lock().clone().map(|user| Session {
                access_token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: far_future(),
                user,
            }))
        }
        async fn get_user(&self) -> AuthResult<Option<Identity>> {
            Ok(self.user.lock().clone())
        }
        async fn update_user(&self, _: &UserUpdate) -> AuthResult<Identity> {
            self.user.lock().clone().ok_or(AuthError::NotLoggedIn)
        }
        async fn resend_verification(&self, _: &str) -> AuthResult<()> {
            Ok(())
        }
        async fn reset_password_for_email(&self, _: &str) -> AuthResult<()> {
            Err(AuthError::NetworkUnavailable)
        }
        fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent> {
            self.events.subscribe()
        }
    }

    fn far_future() -> chrono::DateTime<chrono::Utc> {
        "2099-01-01T00:00:00Z".parse().unwrap()
    }

    struct FakeBackingData {
        exists: AtomicBool,
        verify_error: Option<String>,
        init_calls: AtomicU32,
    }

    impl FakeBackingData {
        fn new(exists: bool) -> Self {
            Self {
                exists: AtomicBool::new(exists),
                verify_error: None,
                init_calls: AtomicU32::new(0),
            }
        }

        fn failing_verify(message: &str) -> Self {
            Self {
                verify_error: Some(message.to_string()),
                ..Self::new(false)
            }
        }
    }

    #[async_trait]
    impl BackingDataVerifier for FakeBackingData {
        async fn has_backing_data(&self, _: &str) -> CollaboratorResult<bool> {
            match &self.verify_error {
                Some(message) => Err(CollaboratorError::Other(message.clone())),
                None => Ok(self.exists.load(Ordering::SeqCst)),
            }
        }
    }

    #[async_trait]
    impl BackingDataInitializer for FakeBackingData {
        async fn initialize_backing_data(&self, _: &str) -> CollaboratorResult<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            self.exists.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        runtime: AppAuthRuntime,
        backing: Arc<FakeBackingData>,
        navigator: Arc<HeadlessNavigation>,
        store: LocalStore,
    }

    fn harness(user: Option<Identity>, backing: FakeBackingData) -> Harness {
        let backing = Arc::new(backing);
        let store = LocalStore::in_memory();
        let device: Arc<dyn DeviceInfoProvider> = Arc::new(StaticDeviceInfo::current("test"));
        let runtime = AppAuthRuntime::new(RuntimeParts {
            provider: Arc::new(FakeProvider::new(user)),
            verifier: backing.clone(),
            initializer: backing.clone(),
            store: store.clone(),
            diagnostics: DiagnosticsSink::new(None, device, None),
            connectivity: Arc::new(ConnectivitySignal::new(true)),
            collaborator_timeout: Duration::from_secs(15),
            navigation: ReconcilerConfig::default(),
            entitlements: None,
            tutor: None,
        })
        .unwrap();
        let navigator = Arc::new(HeadlessNavigation::mounted_at("Auth"));
        runtime.attach_navigation(navigator.clone());
        runtime.set_navigation_ready(true);
        Harness {
            runtime,
            backing,
            navigator,
            store,
        }
    }

    async fn wait_for_status(runtime: &AppAuthRuntime, status: InitializationStatus) {
        let mut rx = runtime.watch_init_status();
        rx.wait_for(|current| *current == status).await.unwrap();
    }

    async fn wait_for_target(runtime: &AppAuthRuntime, target: NavigationIntent) -> ReconcileOutcome {
        let mut rx = runtime.watch_navigation();
        let outcome = rx
            .wait_for(|outcome| outcome.as_ref().is_some_and(|o| o.target() == target))
            .await
            .unwrap();
        outcome.clone().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_initializes_and_navigates_to_main() {
        let h = harness(None, FakeBackingData::new(false));
        assert_eq!(h.runtime.start().await.unwrap(), None);

        let user = h.runtime.sign_in("u-1@example.com", "secret").await.unwrap();
        assert_eq!(user.id, "u-1");

        wait_for_status(&h.runtime, InitializationStatus::Success).await;
        assert_eq!(
            wait_for_target(&h.runtime, NavigationIntent::Main).await,
            ReconcileOutcome::Navigated {
                target: NavigationIntent::Main
            }
        );
        assert_eq!(h.backing.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.navigator.current_route().as_deref(), Some("Main"));
        assert!(h.runtime.is_initialized());
        assert!(h.store.get(StorageKeys::INIT_STATUS).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_session_with_existing_data() {
        let h = harness(Some(identity("u-2")), FakeBackingData::new(true));

        let user = h.runtime.start().await.unwrap();
        assert_eq!(user.unwrap().id, "u-2");

        wait_for_status(&h.runtime, InitializationStatus::Success).await;
        wait_for_target(&h.runtime, NavigationIntent::Main).await;
        assert_eq!(h.backing.init_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_failure_keeps_user_signed_in() {
        let h = harness(Some(identity("u-3")), FakeBackingData::failing_verify("denied"));
        h.runtime.start().await.unwrap();

        wait_for_status(&h.runtime, InitializationStatus::Failed).await;
        wait_for_target(&h.runtime, NavigationIntent::Main).await;

        assert!(h.runtime.has_init_failed());
        assert_eq!(h.runtime.current_user().unwrap().id, "u-3");
        assert_eq!(h.backing.init_calls.load(Ordering::SeqCst), 0);
        let snapshot = h.runtime.snapshot();
        assert_eq!(snapshot.initialization.error.as_deref(), Some("denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_signed_out_navigates_to_auth() {
        let h = harness(None, FakeBackingData::new(true));
        h.navigator.mount("Main");
        h.runtime.start().await.unwrap();

        wait_for_target(&h.runtime, NavigationIntent::Auth).await;
        assert_eq!(h.navigator.current_route().as_deref(), Some("Auth"));
        assert_eq!(h.runtime.init_status(), InitializationStatus::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_store_and_status() {
        let h = harness(Some(identity("u-4")), FakeBackingData::new(true));
        h.runtime.start().await.unwrap();
        wait_for_status(&h.runtime, InitializationStatus::Success).await;
        wait_for_target(&h.runtime, NavigationIntent::Main).await;
        h.store.set("tutor.last_conversation", "c-1").await.unwrap();

        h.runtime.sign_out().await.unwrap();

        wait_for_target(&h.runtime, NavigationIntent::Auth).await;
        assert_eq!(h.runtime.init_status(), InitializationStatus::Unknown);
        assert!(h.store.keys().await.unwrap().is_empty());
        assert!(h.runtime.current_user().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sign_in_is_recorded() {
        let h = harness(None, FakeBackingData::new(true));
        h.runtime.start().await.unwrap();

        let err = h.runtime.sign_in("u-5@example.com", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Auth(ref e) if e.kind() == AuthErrorKind::InvalidCredentials
        ));
        let events = h.runtime.diagnostics().recent();
        assert_eq!(events.last().unwrap().kind, DiagnosticKind::AuthFailure);

        h.runtime.reset_password_for_email("u-5@example.com").await.unwrap_err();
        let events = h.runtime.diagnostics().recent();
        assert_eq!(events.last().unwrap().kind, DiagnosticKind::NetworkIssue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let h = harness(None, FakeBackingData::new(true));
        h.runtime.start().await.unwrap();
        assert!(matches!(
            h.runtime.start().await,
            Err(RuntimeError::AlreadyStarted)
        ));
        h.runtime.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_requires_user() {
        let h = harness(None, FakeBackingData::new(true));
        h.runtime.start().await.unwrap();
        assert!(matches!(
            h.runtime.retry_initialization().await,
            Err(RuntimeError::Auth(AuthError::NotLoggedIn))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_sign_in_requires_retry() {
        let h = harness(None, FakeBackingData::new(false));
        h.runtime.start().await.unwrap();
        h.runtime.set_online(false, None);

        h.runtime.sign_in("u-6@example.com", "secret").await.unwrap();
        wait_for_status(&h.runtime, InitializationStatus::RequiresRetry).await;
        assert_eq!(h.backing.init_calls.load(Ordering::SeqCst), 0);

        h.runtime.set_online(true, Some("wifi".to_string()));
        let outcome = h.runtime.retry_initialization().await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(h.backing.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_settled_follows_sign_in() {
        let h = harness(None, FakeBackingData::new(false));
        h.runtime.start().await.unwrap();

        h.runtime.sign_in("u-7@example.com", "secret").await.unwrap();
        let settled = h
            .runtime
            .wait_until_settled("u-7", Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(settled.outcome, InitOutcome::Succeeded);
        assert_eq!(h.runtime.init_status(), InitializationStatus::Success);
        assert_eq!(h.backing.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_settled_reports_failure_and_timeout() {
        let h = harness(Some(identity("u-8")), FakeBackingData::failing_verify("denied"));
        h.runtime.start().await.unwrap();

        let settled = h
            .runtime
            .wait_until_settled("u-8", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(
            settled.outcome,
            InitOutcome::Failed {
                error: "denied".to_string()
            }
        );
        assert!(h
            .runtime
            .wait_until_settled("someone-else", Duration::from_secs(1))
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_settled_user() {
        let h = harness(Some(identity("u-9")), FakeBackingData::new(true));
        h.runtime.start().await.unwrap();
        h.runtime
            .wait_until_settled("u-9", Duration::from_secs(30))
            .await
            .unwrap();

        h.runtime.sign_out().await.unwrap();
        let mut settled = h.runtime.watch_settled();
        settled.wait_for(Option::is_none).await.unwrap();
    }

    #[tokio::test]
    async fn test_from_config_builds_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::default();

        let runtime = AppAuthRuntime::from_config(&config, &paths).unwrap();
        assert!(runtime.tutor().is_some());
        assert_eq!(runtime.init_status(), InitializationStatus::Unknown);
        assert!(dir.path().join("logs").exists());
    }
}
