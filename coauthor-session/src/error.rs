//! Error types for the session fabric.

use thiserror::Error;

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed upgrade request
    #[error("Bad upgrade request: {0}")]
    BadUpgrade(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
