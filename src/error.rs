//! Error types for the Shaker gateway
//!
//! This module provides structured error definitions using thiserror, with
//! anyhow reserved for the binary edge and executor plug-ins.

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum ShakerError {
    /// Request failed validation (malformed or missing fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Task, artifact or agent not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists (duplicate task ID)
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Operation not allowed in the current state (e.g., cancelling a terminal task)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Remote agent unreachable or returned an unexpected status
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Deadline elapsed while waiting
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Caller cancelled the wait
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Agent card could not be decoded at all
    #[error("Invalid agent card: {0}")]
    InvalidAgentCard(String),

    /// Realtime hub actor unavailable
    #[error("Hub error: {0}")]
    Hub(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, ShakerError>;

/// Convert anyhow::Error to ShakerError
impl From<anyhow::Error> for ShakerError {
    fn from(err: anyhow::Error) -> Self {
        ShakerError::Other(err.to_string())
    }
}

impl ShakerError {
    /// True for errors caused by the caller rather than the gateway
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ShakerError::Validation(_) | ShakerError::NotFound(_) | ShakerError::InvalidState(_)
        )
    }
}
