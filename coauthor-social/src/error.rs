//! Error types for interaction counters.

use thiserror::Error;

/// Interaction counter errors.
#[derive(Error, Debug)]
pub enum SocialError {
    /// Underlying Redis failure
    #[error("Redis error: {0}")]
    Redis(#[from] coauthor_redis::RedisError),

    /// Source-of-truth repository failure
    #[error("stats repository error: {0}")]
    Repo(String),

    /// A shared in-flight lookup failed; the message is the leader's error
    #[error("source lookup failed: {0}")]
    Source(String),

    /// A cached value could not be parsed
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

/// Result type for interaction operations.
pub type SocialResult<T> = Result<T, SocialError>;
