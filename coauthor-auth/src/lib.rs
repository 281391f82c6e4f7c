//! Auth verification client for Coauthor
//!
//! The session endpoint and the social HTTP endpoints authenticate the
//! same way: extract a bearer token (from the `Authorization` header or a
//! `?token=` query parameter, since browsers cannot set custom headers on
//! WebSocket upgrades), then verify it against the external auth service
//! with a short deadline. The auth service itself is out of scope; this
//! crate only speaks its `verify` contract.

pub mod client;
pub mod error;

pub use client::{extract_bearer, AuthClient, AuthConfig, VerifyClaims};
pub use error::{AuthError, AuthResult};
