//! Collaboration engine for Coauthor
//!
//! The per-document operation-apply pipeline: edit deltas, the piece-table
//! text buffer, document state (revision counter, dedup window, ring of
//! recent applied operations), and the collab service that serializes
//! submissions per document.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────┐  submit(base, ops)  ┌──────────────┐   apply    ┌────────────┐
//! │ Session  │────────────────────▶│ CollabService │──────────▶│ PieceTable │
//! │ endpoint │◀────────────────────│  (doc lock)   │           └────────────┘
//! └──────────┘     AppliedOp       └──────┬───────┘
//!                                         │ DocOpEvent (after unlock)
//!                                         ▼
//!                                  ┌──────────────┐
//!                                  │ OpEventSink  │
//!                                  └──────────────┘
//! ```
//!
//! Submissions carry the revision they were produced against; a stale base
//! is rejected with a conflict rather than transformed, and the client is
//! expected to rebase via [`CollabService::ops_since`] and retry.

pub mod buffer;
pub mod delta;
pub mod error;
pub mod event;
pub mod service;

pub use buffer::{PieceTable, TextBuffer};
pub use delta::{Attributes, Delta, DeltaOp};
pub use error::{CollabError, CollabResult};
pub use event::{DocOpEvent, EnqueueError, OpEventSink, EVENT_OP_APPLIED};
pub use service::{
    AppliedOp, CollabConfig, CollabService, DocumentStore, SnapshotStore, UserStore,
};
