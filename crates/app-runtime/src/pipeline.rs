//! User change → backing data → navigation.

use auth_engine::Identity;
use auth_nav_reconciler::NavigationReconciler;
use billing_client::EntitlementsProvider;
use diagnostics_sink::{DiagnosticKind, DiagnosticsSink};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use user_init_lifecycle::{InitOutcome, InitStateMachine};

/// The pipeline finished handling a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettled {
    pub user_id: String,
    pub outcome: InitOutcome,
}

#[derive(Clone)]
pub(crate) struct Pipeline {
    pub init: Arc<InitStateMachine>,
    pub navigation: Arc<NavigationReconciler>,
    pub diagnostics: DiagnosticsSink,
    pub entitlements: Option<Arc<dyn EntitlementsProvider>>,
    /// Last handled user; `None` after a sign-out.
    pub settled: Arc<watch::Sender<Option<UserSettled>>>,
}

impl Pipeline {
    /// Apply user changes one at a time, in the order the observer
    /// reported them.
    pub async fn run(self, mut users: mpsc::UnboundedReceiver<Option<Identity>>) {
        while let Some(user) = users.recv().await {
            self.handle(user).await;
        }
        debug!("Auth pipeline stopped");
    }

    async fn handle(&self, user: Option<Identity>) {
        let Some(user) = user else {
            info!("Signed out, resetting initialization");
            self.init.reset_init_status().await;
            self.navigation.navigate_by_auth_state(false);
            self.settled.send_replace(None);
            return;
        };

        let outcome = self.init.verify_and_initialize(&user.id).await;
        // A failed initialization keeps the user signed in; the UI offers a
        // retry from the main stack.
        self.navigation.navigate_by_auth_state(true);

        match &outcome {
            InitOutcome::Succeeded => self.refresh_entitlements(&user.id).await,
            InitOutcome::Failed { error } => {
                info!(user_id = %user.id, error = %error, "Initialization failed, retry available");
            }
            InitOutcome::Offline => {
                info!(user_id = %user.id, "Initialization deferred until online");
            }
        }
        self.settled.send_replace(Some(UserSettled {
            user_id: user.id,
            outcome,
        }));
    }

    async fn refresh_entitlements(&self, user_id: &str) {
        let Some(entitlements) = &self.entitlements else {
            return;
        };
        match entitlements.get_entitlements(user_id).await {
            Ok(snapshot) => {
                debug!(user_id, active = ?snapshot.active_identifiers(), "Entitlements loaded");
            }
            Err(err) => {
                self.diagnostics.record(
                    DiagnosticKind::ApiError,
                    Some(user_id),
                    json!({ "service": "billing", "error": err.to_string() }),
                );
            }
        }
    }
}
