//! Error types for the presence store.

use thiserror::Error;

/// Presence store errors.
#[derive(Error, Debug)]
pub enum PresenceError {
    /// Underlying Redis failure
    #[error("Redis error: {0}")]
    Redis(#[from] coauthor_redis::RedisError),

    /// A stored value could not be parsed
    #[error("Malformed presence entry: {0}")]
    Malformed(String),
}

/// Result type for presence operations.
pub type PresenceResult<T> = Result<T, PresenceError>;
