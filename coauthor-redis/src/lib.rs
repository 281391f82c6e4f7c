//! Redis substrate for Coauthor
//!
//! Shared plumbing for the presence store and the interaction counters:
//! configuration and a pooled, deadline-bounded service exposing the
//! handful of commands the stores above it need (strings with TTL, atomic
//! pipelines, server-side Lua scripts, key scans).

pub mod config;
pub mod error;
pub mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use service::{RedisConnection, RedisPool, RedisService};
