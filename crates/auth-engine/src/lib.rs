//! Authentication for the Parlo client core.
//!
//! - [`IdentityProvider`]: contract for the authentication backend, with a
//!   Supabase (GoTrue) implementation in [`SupabaseIdentityProvider`]
//! - [`SessionObserver`]: folds the initial session query and the change
//!   stream into one current-user value
//! - [`AuthError`] / [`AuthErrorKind`]: failures classified once, at the
//!   provider boundary, by [`classify_provider_error`]

mod error;
mod observer;
mod provider;
mod supabase;
mod types;

pub use error::{classify_provider_error, AuthError, AuthErrorKind, AuthResult};
pub use observer::{AuthSubscription, SessionObserver, UserListener};
pub use provider::{AccessTokenSource, IdentityProvider, StaticAccessToken};
pub use supabase::SupabaseIdentityProvider;
pub use types::{AuthChangeEvent, Identity, Session, SignUpOutcome, SignUpProfile, UserUpdate};
