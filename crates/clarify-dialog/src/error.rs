//! Error types for the dialogue engine.

use clarify_core::error::ClarifyError;

use crate::flow::PhaseKind;

/// Errors from the dialogue engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("invalid phase transition: {0} -> {1}")]
    InvalidTransition(PhaseKind, PhaseKind),
    #[error("transcript error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for DialogError {
    fn from(err: serde_json::Error) -> Self {
        DialogError::Catalog(err.to_string())
    }
}

impl From<ClarifyError> for DialogError {
    fn from(err: ClarifyError) -> Self {
        DialogError::Config(err.to_string())
    }
}

impl From<DialogError> for ClarifyError {
    fn from(err: DialogError) -> Self {
        match err {
            DialogError::Catalog(msg) => ClarifyError::Catalog(msg),
            DialogError::Io(e) => ClarifyError::Io(e),
            DialogError::Config(msg) => ClarifyError::Config(msg),
            other => ClarifyError::Backend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DialogError>;
