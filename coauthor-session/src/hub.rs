//! Room-based fan-out.
//!
//! The hub holds rooms (doc id → member connection ids) and a registry of
//! connection handles. Connections are referenced by id rather than held
//! directly, so the hub↔connection relationship has no ownership cycle and
//! removal on disconnect is symmetric.

use std::sync::Arc;

use coauthor_collab::AppliedOp;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::ServerMessage;

/// Unique identifier for a connection.
pub type ConnectionId = String;

/// Sending side of a connection's bounded outbound queue.
///
/// `enqueue` never blocks: when the queue is full the message is dropped
/// and logged. Correctness survives drops because clients detect revision
/// gaps and catch up via `opsSince`.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Connection identifier
    pub id: ConnectionId,
    /// Authenticated user behind the connection
    pub user_id: u64,
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a handle over the outbound queue sender.
    pub fn new(id: ConnectionId, user_id: u64, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, user_id, tx }
    }

    /// Non-blocking enqueue, drop-newest on overflow.
    pub fn enqueue(&self, message: ServerMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    connection_id = %self.id,
                    message_type = message.kind(),
                    "outbound queue full, dropping message"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = %self.id, "enqueue on closed connection");
            }
        }
    }
}

/// A per-document room of connections.
#[derive(Default)]
struct Room {
    members: DashMap<ConnectionId, ()>,
}

impl Room {
    fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|r| r.key().clone()).collect()
    }
}

/// Groups connections into per-document rooms and fans messages out.
pub struct Hub {
    rooms: DashMap<String, Arc<Room>>,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    connection_room: DashMap<ConnectionId, String>,
    /// Per-document ordering locks: submit+broadcast run under this lock so
    /// broadcast enqueue order matches revision order.
    order_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            connection_room: DashMap::new(),
            order_locks: DashMap::new(),
        }
    }

    /// Register a connection handle.
    pub fn register_connection(&self, handle: ConnectionHandle) {
        self.connections.insert(handle.id.clone(), handle);
    }

    /// Unregister a connection and vacate any room it joined.
    pub fn unregister_connection(&self, connection_id: &str) {
        if let Some((_, room_id)) = self.connection_room.remove(connection_id) {
            self.remove_from_room(&room_id, connection_id);
        }
        self.connections.remove(connection_id);
    }

    /// Get a connection handle by id.
    pub fn get_connection(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Join a connection to a document room, leaving its previous room if
    /// it was in a different one.
    pub fn join(&self, doc_id: &str, connection_id: &str) {
        if let Some(previous) = self
            .connection_room
            .insert(connection_id.to_string(), doc_id.to_string())
        {
            if previous != doc_id {
                self.remove_from_room(&previous, connection_id);
            }
        }
        self.rooms
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Room::default()))
            .members
            .insert(connection_id.to_string(), ());
    }

    /// Remove a connection from a document room.
    pub fn leave(&self, doc_id: &str, connection_id: &str) {
        self.connection_room
            .remove_if(connection_id, |_, room| room.as_str() == doc_id);
        self.remove_from_room(doc_id, connection_id);
    }

    fn remove_from_room(&self, doc_id: &str, connection_id: &str) {
        if let Some(room) = self.rooms.get(doc_id) {
            room.members.remove(connection_id);
        }
        // remove_if re-checks emptiness under the shard lock, so a
        // concurrent join cannot be wiped out
        self.rooms.remove_if(doc_id, |_, room| room.members.is_empty());
    }

    /// The ordering lock for a document. Callers hold it across
    /// submit-and-broadcast so receivers observe monotonic revisions.
    pub fn room_order(&self, doc_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.order_locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Fan an applied op out to every room member except the submitter.
    /// Returns the number of connections the message was enqueued to.
    pub fn broadcast_applied_op(
        &self,
        doc_id: &str,
        except_connection_id: &str,
        applied: &AppliedOp,
        client_id: &str,
        client_seq: u64,
    ) -> usize {
        let Some(room) = self.rooms.get(doc_id).map(|r| r.clone()) else {
            return 0;
        };

        let mut sent = 0;
        for member_id in room.member_ids() {
            if member_id == except_connection_id {
                continue;
            }
            if let Some(conn) = self.connections.get(&member_id) {
                conn.enqueue(ServerMessage::OpBroadcast {
                    doc_id: doc_id.to_string(),
                    revision: applied.revision,
                    author_id: applied.author_id,
                    client_id: client_id.to_string(),
                    client_seq,
                    ops: applied.ops.clone(),
                    applied_at: applied.applied_at,
                });
                sent += 1;
            }
        }
        sent
    }

    /// Room the connection currently occupies, if any.
    pub fn room_of(&self, connection_id: &str) -> Option<String> {
        self.connection_room
            .get(connection_id)
            .map(|r| r.value().clone())
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
