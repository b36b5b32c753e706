//! Common error types for Crossgate components.

use thiserror::Error;

/// Common errors across Crossgate components
#[derive(Debug, Error)]
pub enum CrossgateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run store / Redis operation error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Token failed validation (shape, signature, mode, or validity window).
    /// Deliberately carries no detail about which check failed.
    #[error("Invalid or expired token")]
    TokenInvalid,

    /// Run plan absent or expired
    #[error("Run plan not found")]
    RunNotFound,

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrossgateError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Storage(_) => 503,
            Self::TokenInvalid => 400,
            Self::RunNotFound => 404,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
