//! Event dispatcher for Coauthor
//!
//! Decouples the submit path from the external event bus: a bounded local
//! queue absorbs bus hiccups, a small worker pool publishes with bounded
//! retries, and the queue-full policy is to honor the caller's deadline and
//! drop — the applied-op ring in the engine is the in-process record, so
//! bus delivery is at-most-once by design.
//!
//! ```text
//! Submit ──enqueue(deadline)──▶ [bounded queue] ──▶ worker ──▶ EventSink
//!                                              ──▶ worker ──▶ (Kafka)
//! ```

pub mod dispatcher;
pub mod error;
pub mod sink;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use dispatcher::{DispatcherConfig, EventDispatcher};
pub use error::{DispatchError, DispatchResult};
pub use sink::EventSink;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSink, KafkaSinkConfig};
