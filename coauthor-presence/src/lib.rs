//! Presence store for Coauthor
//!
//! Tracks which users are live in each document. Rather than a room set
//! plus per-user heartbeat keys whose TTLs can diverge, each room is a
//! single sorted set keyed by user id and scored by logical expiry, plus a
//! user-id → username hash. A single server-side script garbage-collects
//! expired members and returns the survivors atomically, so concurrent
//! writers cannot resurrect entries mid-GC.

pub mod error;
pub mod keys;
pub mod store;

pub use error::{PresenceError, PresenceResult};
pub use store::{PresenceMember, PresenceStore, RedisPresence};
