//! Reconciled "current user" on top of an identity provider.
//!
//! Two sources report the user: the one-shot session query issued by
//! [`SessionObserver::initialize`] and the provider's change stream consumed
//! after [`SessionObserver::subscribe`]. Stream events are applied in the
//! order received. An initial query result is discarded when a stream event
//! was applied while the query was in flight, since the stream is newer.

use crate::{AuthChangeEvent, AuthError, AuthResult, Identity, IdentityProvider};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Listener invoked with the new user (or `None` on sign-out).
///
/// Runs while the observer's state lock is held so notifications keep the
/// order in which they were applied; it must not block or call back into
/// the observer.
pub type UserListener = Arc<dyn Fn(Option<Identity>) + Send + Sync>;

struct ObserverState {
    current: Option<Identity>,
    /// Count of stream events applied so far.
    stream_seq: u64,
    listener: Option<UserListener>,
}

struct Shared {
    state: Mutex<ObserverState>,
    user_tx: watch::Sender<Option<Identity>>,
}

impl Shared {
    /// Apply a user value. Returns true when it changed the current user.
    fn apply(&self, state: &mut ObserverState, user: Option<Identity>) -> bool {
        if state.current == user {
            return false;
        }
        debug!(
            user_id = ?user.as_ref().map(|u| u.id.as_str()),
            "Current user changed"
        );
        state.current = user.clone();
        self.user_tx.send_replace(user.clone());
        if let Some(listener) = &state.listener {
            listener(user);
        }
        true
    }

    fn apply_stream(&self, user: Option<Identity>) {
        let mut state = self.state.lock();
        state.stream_seq += 1;
        self.apply(&mut state, user);
    }

    fn apply_initial(&self, user: Option<Identity>, seq_at_start: u64) -> Option<Identity> {
        let mut state = self.state.lock();
        if state.stream_seq != seq_at_start {
            debug!("Change events arrived during initial query, keeping stream value");
            return state.current.clone();
        }
        self.apply(&mut state, user);
        state.current.clone()
    }
}

/// Single writer of the current user.
pub struct SessionObserver {
    provider: Arc<dyn IdentityProvider>,
    shared: Arc<Shared>,
    subscribed: AtomicBool,
}

impl SessionObserver {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (user_tx, _) = watch::channel(None);
        Self {
            provider,
            shared: Arc::new(Shared {
                state: Mutex::new(ObserverState {
                    current: None,
                    stream_seq: 0,
                    listener: None,
                }),
                user_tx,
            }),
            subscribed: AtomicBool::new(false),
        }
    }

    /// Issue the one-shot session query.
    ///
    /// Returns the user when a valid session exists and `Ok(None)` when
    /// there is none. Only genuine failures (network, server) are errors.
    pub async fn initialize(&self) -> AuthResult<Option<Identity>> {
        let seq_at_start = self.shared.state.lock().stream_seq;

        let user = match self.provider.get_session().await {
            Ok(session) => session.map(|s| s.user),
            Err(err) if err.is_session_missing() => {
                debug!("No session on initialize");
                None
            }
            Err(err) => {
                warn!(error = %err, kind = %err.kind(), "Initial session query failed");
                return Err(err);
            }
        };

        Ok(self.shared.apply_initial(user, seq_at_start))
    }

    /// Register the change listener and start consuming the provider's
    /// change stream. Allowed once per observer.
    pub fn subscribe(&self, on_change: UserListener) -> AuthResult<AuthSubscription> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| AuthError::Config("subscribe requires a tokio runtime".to_string()))?;
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(AuthError::AlreadySubscribed);
        }

        self.shared.state.lock().listener = Some(on_change);
        let receiver = self.provider.on_auth_state_change();
        let task = handle.spawn(run_change_stream(
            receiver,
            self.shared.clone(),
            self.provider.clone(),
        ));
        info!("Auth change subscription started");

        Ok(AuthSubscription {
            task: Some(task),
            shared: self.shared.clone(),
        })
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.shared.state.lock().current.clone()
    }

    /// Receiver that always holds the current user.
    pub fn watch_user(&self) -> watch::Receiver<Option<Identity>> {
        self.shared.user_tx.subscribe()
    }
}

async fn run_change_stream(
    mut receiver: broadcast::Receiver<AuthChangeEvent>,
    shared: Arc<Shared>,
    provider: Arc<dyn IdentityProvider>,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                debug!(event = event.name(), "Auth change event");
                if let Some(user) = event.user_change() {
                    shared.apply_stream(user.cloned());
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth change stream lagged, resyncing session");
                match provider.get_session().await {
                    Ok(session) => shared.apply_stream(session.map(|s| s.user)),
                    Err(err) if err.is_session_missing() => shared.apply_stream(None),
                    Err(err) => warn!(error = %err, "Resync after lag failed"),
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Auth change stream closed");
                break;
            }
        }
    }
}

/// Handle for an active change subscription. Dropping it stops delivery.
pub struct AuthSubscription {
    task: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl AuthSubscription {
    /// Stop delivering change events to the listener.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.shared.state.lock().listener = None;
            info!("Auth change subscription stopped");
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
