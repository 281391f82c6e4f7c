//! Error types for the collaboration engine.

use thiserror::Error;

/// Collaboration engine errors.
#[derive(Error, Debug)]
pub enum CollabError {
    /// A delta addressed a position past the end of the buffer
    #[error("position {pos} out of bounds (buffer length {len})")]
    BadPosition { pos: usize, len: usize },

    /// The submitted base revision does not match the current revision
    #[error("revision conflict: base {base}, current {current}")]
    RevisionConflict { base: u64, current: u64 },

    /// The client sequence number did not strictly increase
    #[error("duplicate or out-of-order client sequence {seq} (last accepted {last})")]
    DuplicateOrOutOfOrder { seq: u64, last: u64 },

    /// Unknown document id or title
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Requested operations have been evicted from the ring
    #[error("operations before revision {oldest} are no longer retained")]
    Truncated { oldest: u64 },

    /// Durable store failure
    #[error("store error: {0}")]
    Store(String),

    /// A required store was not wired in
    #[error("{0} store not configured")]
    StoreNotConfigured(&'static str),

    /// Operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,
}

impl CollabError {
    /// Stable machine-readable code, used in wire-level error replies.
    pub fn code(&self) -> &'static str {
        match self {
            CollabError::BadPosition { .. } => "BAD_POSITION",
            CollabError::RevisionConflict { .. } => "REVISION_CONFLICT",
            CollabError::DuplicateOrOutOfOrder { .. } => "DUPLICATE_OR_OUT_OF_ORDER",
            CollabError::DocumentNotFound(_) => "NOT_FOUND",
            CollabError::Truncated { .. } => "TRUNCATED",
            CollabError::Store(_) => "STORE_ERROR",
            CollabError::StoreNotConfigured(_) => "STORE_ERROR",
            CollabError::Timeout => "TIMEOUT",
        }
    }
}

/// Result type for collaboration operations.
pub type CollabResult<T> = Result<T, CollabError>;
