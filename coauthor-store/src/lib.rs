//! Durable stores for Coauthor
//!
//! MySQL persistence behind the engine's store seams: document snapshots,
//! the document registry, users, and the interaction stats the counter
//! cache reads through to. Built on `diesel-async` with a bb8 pool.

pub mod config;
pub mod error;
pub mod pool;
pub mod schema;
pub mod stores;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use pool::{Database, MysqlPool};
pub use stores::{MysqlDocStatsRepo, MysqlDocumentStore, MysqlSnapshotStore, MysqlUserStore};
