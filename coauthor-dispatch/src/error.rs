//! Error types for event dispatch.

use thiserror::Error;

/// Dispatch errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Publishing to the bus failed
    #[error("publish error: {0}")]
    Publish(String),

    /// The event could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker connection failure
    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
