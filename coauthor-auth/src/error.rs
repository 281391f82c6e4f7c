//! Error types for auth verification.

use thiserror::Error;

/// Auth verification errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token missing, rejected, or not an access token
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The verify endpoint was unreachable or answered unexpectedly
    #[error("auth upstream error: {0}")]
    Upstream(String),
}

impl AuthError {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(_) => "UNAUTHENTICATED",
            AuthError::Upstream(_) => "AUTH_UPSTREAM_ERROR",
        }
    }

    /// HTTP status this error maps to at the edge.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::Unauthenticated(_) => 401,
            AuthError::Upstream(_) => 502,
        }
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
