//! Session fabric for Coauthor
//!
//! The WebSocket-facing half of the system: the hub that groups
//! connections into per-document rooms and fans applied operations out,
//! the per-connection reader/writer task pair with a bounded outbound
//! queue, and the listener that authenticates the upgrade handshake
//! against the external auth service.
//!
//! ```text
//!             ┌─────────────── SessionServer ───────────────┐
//! upgrade ───▶│ verify token ─▶ 101 ─▶ reader ──┐           │
//!             │                        writer ◀─┤ Connection │
//!             └─────────────────────────────────┼───────────┘
//!                                               ▼
//!                     Hub rooms ──▶ other connections (op_broadcast)
//!                     CollabService ──▶ AppliedOp (op_applied ack)
//!                     PresenceStore ──▶ heartbeat / join / create
//! ```

pub mod connection;
pub mod error;
pub mod hub;
pub mod message;
pub mod server;

pub use connection::{Connection, SessionConfig, SessionContext};
pub use error::{SessionError, SessionResult};
pub use hub::{ConnectionHandle, ConnectionId, Hub};
pub use message::{ClientMessage, MemberEntry, ServerMessage};
pub use server::{SessionServer, SessionServerConfig};
