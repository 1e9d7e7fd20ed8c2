use serde::{Deserialize, Serialize};

/// Which root stack the app should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationIntent {
    Auth,
    Main,
}

impl NavigationIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationIntent::Auth => "auth",
            NavigationIntent::Main => "main",
        }
    }
}

impl std::fmt::Display for NavigationIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Main` only for an authenticated user outside a password-reset flow.
pub fn compute_intent(is_authenticated: bool, reset_flow_active: bool) -> NavigationIntent {
    if is_authenticated && !reset_flow_active {
        NavigationIntent::Main
    } else {
        NavigationIntent::Auth
    }
}

/// Host route names for each intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNames {
    pub main: String,
    pub auth: String,
}

impl Default for RouteNames {
    fn default() -> Self {
        Self {
            main: "Main".to_string(),
            auth: "Auth".to_string(),
        }
    }
}

impl RouteNames {
    pub fn route_for(&self, intent: NavigationIntent) -> &str {
        match intent {
            NavigationIntent::Main => &self.main,
            NavigationIntent::Auth => &self.auth,
        }
    }
}
