//! Error types for the durable stores.

use thiserror::Error;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for coauthor_collab::CollabError {
    fn from(err: StoreError) -> Self {
        coauthor_collab::CollabError::Store(err.to_string())
    }
}

impl From<StoreError> for coauthor_social::SocialError {
    fn from(err: StoreError) -> Self {
        coauthor_social::SocialError::Repo(err.to_string())
    }
}
