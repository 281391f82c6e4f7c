//! Event sink trait.

use async_trait::async_trait;
use coauthor_collab::DocOpEvent;

use crate::error::DispatchResult;

/// One publish attempt against the external event bus.
///
/// The dispatcher owns queuing and retry; implementations only perform a
/// single delivery attempt.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event, keyed by its document id.
    async fn publish(&self, event: &DocOpEvent) -> DispatchResult<()>;
}
