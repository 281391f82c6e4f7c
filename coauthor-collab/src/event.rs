//! Bus-facing record of an applied operation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delta::Delta;
use crate::service::AppliedOp;

/// Event type tag carried on every published record.
pub const EVENT_OP_APPLIED: &str = "OP_APPLIED";

/// Record published to the external event bus for every applied operation.
/// Keyed by `doc_id` for partitioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocOpEvent {
    pub event_type: String,
    pub doc_id: String,
    pub operation_id: String,
    pub revision: u64,
    pub author_id: u64,
    pub client_id: String,
    pub client_seq: u64,
    pub base_revision: u64,
    pub ops: Delta,
    pub applied_at: DateTime<Utc>,
}

impl DocOpEvent {
    /// Build the bus record for an applied operation.
    pub fn op_applied(
        doc_id: &str,
        client_id: &str,
        client_seq: u64,
        base_revision: u64,
        applied: &AppliedOp,
    ) -> Self {
        Self {
            event_type: EVENT_OP_APPLIED.to_string(),
            doc_id: doc_id.to_string(),
            operation_id: applied.operation_id.clone(),
            revision: applied.revision,
            author_id: applied.author_id,
            client_id: client_id.to_string(),
            client_seq,
            base_revision,
            ops: applied.ops.clone(),
            applied_at: applied.applied_at,
        }
    }
}

/// Enqueue failure. The queue is best-effort: callers log and move on.
#[derive(Error, Debug)]
pub enum EnqueueError {
    /// No queue space became available within the caller's deadline
    #[error("dispatch queue full past deadline")]
    Cancelled,

    /// The dispatcher has shut down
    #[error("dispatcher closed")]
    Closed,
}

/// Seam between the engine and the asynchronous event dispatcher.
///
/// Implementations must not block the caller beyond `deadline`; the engine
/// invokes this only after releasing the per-document lock.
#[async_trait]
pub trait OpEventSink: Send + Sync {
    /// Queue an event for publication, waiting at most `deadline` for space.
    async fn enqueue(&self, event: DocOpEvent, deadline: Duration) -> Result<(), EnqueueError>;
}
