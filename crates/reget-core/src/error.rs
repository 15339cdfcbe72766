//! Error types for reget core

use thiserror::Error;

/// Errors that can occur in reget core
#[derive(Debug, Error)]
pub enum RegetError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Body stream error: {0}")]
    Stream(std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Download was cancelled")]
    Cancelled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RegetError {
    /// Check if this error is retryable
    ///
    /// Everything the transport or a response body reports is transient;
    /// local I/O and cancellation are decided by the engine and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegetError::Network(_) | RegetError::ServerError { .. } | RegetError::Stream(_) => {
                true
            }
            RegetError::Io(_)
            | RegetError::InvalidUrl(_)
            | RegetError::Cancelled
            | RegetError::Unknown(_) => false,
        }
    }
}

// Allow converting to String for outcome reporting
impl From<RegetError> for String {
    fn from(error: RegetError) -> Self {
        error.to_string()
    }
}
