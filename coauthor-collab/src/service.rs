//! Document state and the collab service.
//!
//! One [`DocState`] per document, created on first reference and owned by
//! the service for the process lifetime. The per-document write lock is the
//! only correctness-critical synchronization point: everything between
//! acquiring it and releasing it is synchronous, and the bus enqueue
//! happens after release.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::buffer::{PieceTable, TextBuffer};
use crate::delta::Delta;
use crate::error::{CollabError, CollabResult};
use crate::event::{DocOpEvent, OpEventSink};

/// Server-authoritative record of a submitted delta that advanced a
/// document's revision. Created only by a successful submit; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedOp {
    /// Process-unique operation id, for idempotence and tracing
    pub operation_id: String,
    pub revision: u64,
    pub author_id: u64,
    pub ops: Delta,
    pub applied_at: DateTime<Utc>,
}

/// Durable snapshot persistence.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `(doc_id, revision, content)`. A duplicate
    /// `(doc_id, revision)` pair is a no-op success.
    async fn save_document_snapshot(
        &self,
        doc_id: &str,
        revision: u64,
        content: &str,
    ) -> CollabResult<()>;
}

/// Durable document registry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolve a title to its document id.
    async fn get_document_id(&self, title: &str) -> CollabResult<Option<String>>;

    /// Create a document and return its generated id.
    async fn create_document(&self, owner_id: u64, title: &str) -> CollabResult<String>;
}

/// Durable user registry.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Resolve a username to its user id.
    async fn get_user_id(&self, username: &str) -> CollabResult<Option<u64>>;
}

/// Per-document in-memory state.
struct DocState {
    /// Number of successfully applied ops since creation
    revision: u64,
    buffer: Box<dyn TextBuffer>,
    /// Most recent applied ops in ascending revision order, bounded
    ring: VecDeque<AppliedOp>,
    /// Dedup window: highest accepted clientSeq per clientId
    last_seq_by_client: HashMap<String, u64>,
}

impl DocState {
    fn new(ring_capacity: usize) -> Self {
        Self {
            revision: 0,
            buffer: Box::new(PieceTable::new("")),
            ring: VecDeque::with_capacity(ring_capacity),
            last_seq_by_client: HashMap::new(),
        }
    }
}

/// Collab service configuration.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Capacity of the per-document applied-op ring
    pub ring_capacity: usize,
    /// How long a submit may wait for dispatch queue space
    pub enqueue_deadline: Duration,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            enqueue_deadline: Duration::from_millis(200),
        }
    }
}

/// In-memory collaboration engine holding the state of every document.
///
/// Thread-safe; documents are sharded across a concurrent map so separate
/// documents never contend.
pub struct CollabService {
    docs: DashMap<String, Arc<RwLock<DocState>>>,
    config: CollabConfig,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    documents: Option<Arc<dyn DocumentStore>>,
    users: Option<Arc<dyn UserStore>>,
    events: Option<Arc<dyn OpEventSink>>,
}

impl CollabService {
    /// Create a service with the default configuration and no stores wired.
    pub fn new() -> Self {
        Self::with_config(CollabConfig::default())
    }

    /// Create a service with a custom configuration.
    pub fn with_config(mut config: CollabConfig) -> Self {
        if config.ring_capacity == 0 {
            config.ring_capacity = CollabConfig::default().ring_capacity;
        }
        Self {
            docs: DashMap::new(),
            config,
            snapshots: None,
            documents: None,
            users: None,
            events: None,
        }
    }

    /// Wire in the snapshot store.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Wire in the document store.
    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    /// Wire in the user store.
    pub fn with_user_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.users = Some(store);
        self
    }

    /// Wire in the event sink that receives a record per applied op.
    pub fn with_event_sink(mut self, sink: Arc<dyn OpEventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Get or create the state for a document.
    fn doc(&self, doc_id: &str) -> Arc<RwLock<DocState>> {
        self.docs
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(DocState::new(self.config.ring_capacity))))
            .clone()
    }

    fn existing_doc(&self, doc_id: &str) -> Option<Arc<RwLock<DocState>>> {
        self.docs.get(doc_id).map(|e| e.value().clone())
    }

    /// Submit an edit against `base_revision`.
    ///
    /// Under the document's exclusive lock: rejects a non-increasing
    /// `client_seq`, rejects a stale base, applies the delta, bumps the
    /// revision, and records the applied op in the ring. The bus event is
    /// enqueued after the lock is released; enqueue failure is logged and
    /// the event dropped (the ring is the in-process record).
    pub async fn submit(
        &self,
        doc_id: &str,
        author_id: u64,
        base_revision: u64,
        client_id: &str,
        client_seq: u64,
        ops: Delta,
    ) -> CollabResult<AppliedOp> {
        let state = self.doc(doc_id);
        let applied = {
            let mut ds = state.write().await;

            if let Some(&last) = ds.last_seq_by_client.get(client_id) {
                if client_seq <= last {
                    return Err(CollabError::DuplicateOrOutOfOrder {
                        seq: client_seq,
                        last,
                    });
                }
            }
            if base_revision != ds.revision {
                return Err(CollabError::RevisionConflict {
                    base: base_revision,
                    current: ds.revision,
                });
            }

            ds.buffer.apply(&ops)?;

            ds.revision += 1;
            let applied = AppliedOp {
                operation_id: format!("o-{}", Uuid::new_v4().simple()),
                revision: ds.revision,
                author_id,
                ops,
                applied_at: Utc::now(),
            };

            if ds.ring.len() == self.config.ring_capacity {
                ds.ring.pop_front();
            }
            ds.ring.push_back(applied.clone());
            ds.last_seq_by_client
                .insert(client_id.to_string(), client_seq);

            applied
        };

        if let Some(sink) = &self.events {
            let event =
                DocOpEvent::op_applied(doc_id, client_id, client_seq, base_revision, &applied);
            if let Err(err) = sink
                .enqueue(event, self.config.enqueue_deadline)
                .await
            {
                warn!(
                    doc_id = %doc_id,
                    operation_id = %applied.operation_id,
                    revision = applied.revision,
                    error = %err,
                    "dropping op event"
                );
            }
        }

        Ok(applied)
    }

    /// Current revision of a document; `0` if unknown.
    pub async fn current_revision(&self, doc_id: &str) -> u64 {
        match self.existing_doc(doc_id) {
            Some(state) => state.read().await.revision,
            None => 0,
        }
    }

    /// Applied ops with revision strictly greater than `from_revision`, in
    /// ascending order, truncated to `limit` entries when `limit > 0`.
    ///
    /// Returns [`CollabError::Truncated`] when `from_revision` predates the
    /// oldest retained ring entry; an unknown document yields an empty list.
    pub async fn ops_since(
        &self,
        doc_id: &str,
        from_revision: u64,
        limit: usize,
    ) -> CollabResult<Vec<AppliedOp>> {
        let Some(state) = self.existing_doc(doc_id) else {
            return Ok(Vec::new());
        };
        let ds = state.read().await;

        // revision of the last op evicted from the ring
        let oldest_retained = ds.revision - ds.ring.len() as u64;
        if from_revision < oldest_retained {
            return Err(CollabError::Truncated {
                oldest: oldest_retained + 1,
            });
        }

        let mut out = Vec::new();
        for op in ds.ring.iter().filter(|op| op.revision > from_revision) {
            out.push(op.clone());
            if limit > 0 && out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Current content and revision of a document.
    pub async fn load_document_content(&self, doc_id: &str) -> CollabResult<(String, u64)> {
        let state = self
            .existing_doc(doc_id)
            .ok_or_else(|| CollabError::DocumentNotFound(doc_id.to_string()))?;
        let ds = state.read().await;
        Ok((ds.buffer.text(), ds.revision))
    }

    /// Read `(content, revision)` under the document read lock and persist
    /// them through the snapshot store.
    pub async fn save_snapshot(&self, doc_id: &str) -> CollabResult<()> {
        let store = self
            .snapshots
            .as_ref()
            .ok_or(CollabError::StoreNotConfigured("snapshot"))?;
        let state = self
            .existing_doc(doc_id)
            .ok_or_else(|| CollabError::DocumentNotFound(doc_id.to_string()))?;

        let (content, revision) = {
            let ds = state.read().await;
            (ds.buffer.text(), ds.revision)
        };
        store
            .save_document_snapshot(doc_id, revision, &content)
            .await
    }

    /// Create a document in the registry; returns the new id.
    pub async fn create_document(&self, owner_id: u64, title: &str) -> CollabResult<String> {
        let store = self
            .documents
            .as_ref()
            .ok_or(CollabError::StoreNotConfigured("document"))?;
        store.create_document(owner_id, title).await
    }

    /// Resolve a document title to its id.
    pub async fn get_document_id(&self, title: &str) -> CollabResult<String> {
        let store = self
            .documents
            .as_ref()
            .ok_or(CollabError::StoreNotConfigured("document"))?;
        store
            .get_document_id(title)
            .await?
            .ok_or_else(|| CollabError::DocumentNotFound(title.to_string()))
    }

    /// Resolve a username to its id, if registered.
    pub async fn get_user_id(&self, username: &str) -> CollabResult<Option<u64>> {
        let store = self
            .users
            .as_ref()
            .ok_or(CollabError::StoreNotConfigured("user"))?;
        store.get_user_id(username).await
    }
}

impl Default for CollabService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EnqueueError, EVENT_OP_APPLIED};
    use tokio::sync::Mutex;

    fn service() -> CollabService {
        CollabService::new()
    }

    fn small_ring(capacity: usize) -> CollabService {
        CollabService::with_config(CollabConfig {
            ring_capacity: capacity,
            ..CollabConfig::default()
        })
    }

    #[tokio::test]
    async fn test_submit_advances_revision() {
        let svc = service();

        let op = svc
            .submit("d1", 1, 0, "c1", 1, Delta::new().insert("Hello"))
            .await
            .unwrap();
        assert_eq!(op.revision, 1);
        assert_eq!(svc.current_revision("d1").await, 1);

        let op = svc
            .submit("d1", 1, 1, "c1", 2, Delta::new().retain(5).insert(" world"))
            .await
            .unwrap();
        assert_eq!(op.revision, 2);

        let (content, revision) = svc.load_document_content("d1").await.unwrap();
        assert_eq!(content, "Hello world");
        assert_eq!(revision, 2);
    }

    #[tokio::test]
    async fn test_stale_base_is_rejected_and_state_unchanged() {
        let svc = service();
        svc.submit("d1", 1, 0, "c1", 1, Delta::new().insert("Hello"))
            .await
            .unwrap();

        // two clients race from revision 1: the second base-1 submit lands
        // after the first advanced the document to 2
        svc.submit("d1", 1, 1, "c1", 2, Delta::new().retain(5).insert("!"))
            .await
            .unwrap();
        let err = svc
            .submit("d1", 2, 1, "c2", 1, Delta::new().insert("X"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollabError::RevisionConflict { base: 1, current: 2 }
        ));

        let (content, revision) = svc.load_document_content("d1").await.unwrap();
        assert_eq!(content, "Hello!");
        assert_eq!(revision, 2);

        // rebased resubmission succeeds
        let op = svc
            .submit("d1", 2, 2, "c2", 2, Delta::new().insert("X"))
            .await
            .unwrap();
        assert_eq!(op.revision, 3);
    }

    #[tokio::test]
    async fn test_client_seq_must_strictly_increase() {
        let svc = service();
        svc.submit("d1", 1, 0, "c1", 5, Delta::new().insert("a"))
            .await
            .unwrap();

        for seq in [5, 4, 1] {
            let err = svc
                .submit("d1", 1, 1, "c1", seq, Delta::new().insert("b"))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                CollabError::DuplicateOrOutOfOrder { last: 5, .. }
            ));
        }

        // a different client is tracked independently
        svc.submit("d1", 2, 1, "c2", 1, Delta::new().insert("b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_buffer_error_leaves_counters_untouched() {
        let svc = service();
        svc.submit("d1", 1, 0, "c1", 1, Delta::new().insert("abc"))
            .await
            .unwrap();

        let err = svc
            .submit("d1", 1, 1, "c1", 2, Delta::new().retain(10).insert("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::BadPosition { .. }));

        assert_eq!(svc.current_revision("d1").await, 1);
        // the failed submit did not consume the client sequence number
        svc.submit("d1", 1, 1, "c1", 2, Delta::new().retain(3).insert("x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ring_is_bounded_and_ascending() {
        let svc = small_ring(4);
        for seq in 1..=10u64 {
            svc.submit("d1", 1, seq - 1, "c1", seq, Delta::new().insert("x"))
                .await
                .unwrap();
        }

        let ops = svc.ops_since("d1", 6, 0).await.unwrap();
        let revisions: Vec<u64> = ops.iter().map(|op| op.revision).collect();
        assert_eq!(revisions, vec![7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_ops_since_limit_and_unknown_doc() {
        let svc = service();
        for seq in 1..=5u64 {
            svc.submit("d1", 1, seq - 1, "c1", seq, Delta::new().insert("x"))
                .await
                .unwrap();
        }

        let ops = svc.ops_since("d1", 1, 2).await.unwrap();
        assert_eq!(
            ops.iter().map(|op| op.revision).collect::<Vec<_>>(),
            vec![2, 3]
        );

        assert!(svc.ops_since("missing", 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ops_since_signals_truncation() {
        let svc = small_ring(2);
        for seq in 1..=5u64 {
            svc.submit("d1", 1, seq - 1, "c1", seq, Delta::new().insert("x"))
                .await
                .unwrap();
        }

        // ring holds revisions 4..=5; asking from 2 would skip revision 3
        let err = svc.ops_since("d1", 2, 0).await.unwrap_err();
        assert!(matches!(err, CollabError::Truncated { oldest: 4 }));

        // from the ring floor onward everything is served
        let ops = svc.ops_since("d1", 3, 0).await.unwrap();
        assert_eq!(
            ops.iter().map(|op| op.revision).collect::<Vec<_>>(),
            vec![4, 5]
        );
    }

    #[tokio::test]
    async fn test_unknown_document_surfaces() {
        let svc = service();
        assert_eq!(svc.current_revision("nope").await, 0);
        assert!(matches!(
            svc.load_document_content("nope").await.unwrap_err(),
            CollabError::DocumentNotFound(_)
        ));
    }

    struct RecordingSnapshots {
        saved: Mutex<Vec<(String, u64, String)>>,
    }

    #[async_trait]
    impl SnapshotStore for RecordingSnapshots {
        async fn save_document_snapshot(
            &self,
            doc_id: &str,
            revision: u64,
            content: &str,
        ) -> CollabResult<()> {
            self.saved
                .lock()
                .await
                .push((doc_id.to_string(), revision, content.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_save_snapshot_reads_consistent_pair() {
        let snapshots = Arc::new(RecordingSnapshots {
            saved: Mutex::new(Vec::new()),
        });
        let svc = service().with_snapshot_store(snapshots.clone());

        svc.submit("d1", 1, 0, "c1", 1, Delta::new().insert("Hello"))
            .await
            .unwrap();
        svc.save_snapshot("d1").await.unwrap();

        let saved = snapshots.saved.lock().await;
        assert_eq!(saved.as_slice(), &[("d1".into(), 1, "Hello".into())]);
    }

    struct RecordingSink {
        events: Mutex<Vec<DocOpEvent>>,
    }

    #[async_trait]
    impl OpEventSink for RecordingSink {
        async fn enqueue(
            &self,
            event: DocOpEvent,
            _deadline: Duration,
        ) -> Result<(), EnqueueError> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submit_emits_bus_event() {
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let svc = service().with_event_sink(sink.clone());

        let op = svc
            .submit("d1", 9, 0, "c1", 1, Delta::new().insert("hi"))
            .await
            .unwrap();

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, EVENT_OP_APPLIED);
        assert_eq!(event.doc_id, "d1");
        assert_eq!(event.operation_id, op.operation_id);
        assert_eq!(event.revision, 1);
        assert_eq!(event.author_id, 9);
        assert_eq!(event.base_revision, 0);
    }

    struct RejectingSink;

    #[async_trait]
    impl OpEventSink for RejectingSink {
        async fn enqueue(
            &self,
            _event: DocOpEvent,
            _deadline: Duration,
        ) -> Result<(), EnqueueError> {
            Err(EnqueueError::Cancelled)
        }
    }

    struct OneUser;

    #[async_trait]
    impl UserStore for OneUser {
        async fn get_user_id(&self, username: &str) -> CollabResult<Option<u64>> {
            Ok((username == "alice").then_some(7))
        }
    }

    #[tokio::test]
    async fn test_user_lookup_passes_through() {
        let svc = service().with_user_store(Arc::new(OneUser));
        assert_eq!(svc.get_user_id("alice").await.unwrap(), Some(7));
        assert_eq!(svc.get_user_id("mallory").await.unwrap(), None);

        let unwired = service();
        assert!(matches!(
            unwired.get_user_id("alice").await.unwrap_err(),
            CollabError::StoreNotConfigured("user")
        ));
    }

    #[tokio::test]
    async fn test_enqueue_failure_does_not_fail_submit() {
        let svc = service().with_event_sink(Arc::new(RejectingSink));
        let op = svc
            .submit("d1", 1, 0, "c1", 1, Delta::new().insert("hi"))
            .await
            .unwrap();
        assert_eq!(op.revision, 1);
    }

    #[tokio::test]
    async fn test_concurrent_submits_serialize_per_document() {
        let svc = Arc::new(service());
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                // every task retries with a refreshed base until accepted
                let client = format!("c{i}");
                let mut seq = 1u64;
                loop {
                    let base = svc.current_revision("d1").await;
                    match svc
                        .submit("d1", i, base, &client, seq, Delta::new().insert("x"))
                        .await
                    {
                        Ok(op) => return op.revision,
                        Err(CollabError::RevisionConflict { .. }) => {
                            seq += 1;
                            tokio::task::yield_now().await;
                        }
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            }));
        }

        let mut revisions = Vec::new();
        for handle in handles {
            revisions.push(handle.await.unwrap());
        }
        revisions.sort_unstable();
        // gap-free monotonic sequence: every submit got a distinct revision
        assert_eq!(revisions, (1..=8).collect::<Vec<_>>());
        assert_eq!(svc.current_revision("d1").await, 8);
    }
}
