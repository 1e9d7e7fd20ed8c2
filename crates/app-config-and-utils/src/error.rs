use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A config value is present but unusable.
    #[error("Invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Home directory not found")]
    HomeDirUnavailable,
}

pub type CoreResult<T> = Result<T, CoreError>;
