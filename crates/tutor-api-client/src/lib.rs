//! Conversational tutor HTTP API.

mod client;
mod types;

pub use client::TutorClient;
pub use types::{
    Conversation, Correction, CreateConversationParams, SendMessageParams, TutorReply,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Auth error: {0}")]
    Auth(#[from] auth_engine::AuthError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tutor API rejected request: {status} ({body_summary})")]
    Rejected { status: u16, body_summary: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type TutorResult<T> = Result<T, TutorError>;
