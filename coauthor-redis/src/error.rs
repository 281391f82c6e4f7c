//! Error types for Redis operations.

use thiserror::Error;

/// Redis error type.
#[derive(Error, Debug)]
pub enum RedisError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Command execution error
    #[error("Command error: {0}")]
    Command(#[from] redis::RedisError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;
