//! Core types, configuration, and utilities shared by the Parlo client crates.

mod config;
mod connectivity;
mod error;
mod logging;
mod paths;
pub mod retry;

pub use config::{
    Config, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL, DEFAULT_TUTOR_API_URL,
};
pub use connectivity::{ConnectivityProbe, ConnectivitySignal, NetworkSnapshot};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
pub use retry::{Backoff, RetryPolicy};
