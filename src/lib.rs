// Coauthor - server side of a real-time collaborative document editor
//
// This facade crate re-exports the workspace members: the collaboration
// engine, the session fabric, the event dispatcher, and the Redis-backed
// presence and interaction stores.

// Re-export the collaboration engine (deltas, piece table, document state)
pub use coauthor_collab as collab;

// Re-export the session fabric (hub, connections, WebSocket endpoint)
pub use coauthor_session as session;

// Re-export the event dispatcher
pub use coauthor_dispatch as dispatch;

// Re-export the Redis substrate
pub use coauthor_redis as redis;

// Re-export the presence store
pub use coauthor_presence as presence;

// Re-export the interaction counters
pub use coauthor_social as social;

// Re-export the auth verification client
pub use coauthor_auth as auth;

// Re-export the durable stores
pub use coauthor_store as store;

/// Install a process-wide tracing subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`); repeated calls after
/// the first are no-ops so tests can call this freely.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
