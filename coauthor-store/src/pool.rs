//! MySQL connection pool.

use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncMysqlConnection;
use tracing::info;

use crate::{StoreConfig, StoreError, StoreResult};

/// Type alias for the connection pool.
pub type MysqlPool = Pool<AsyncMysqlConnection>;

/// Shared database handle the stores are built over.
#[derive(Clone)]
pub struct Database {
    pool: MysqlPool,
}

impl Database {
    /// Connect a pool for the configured database.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let manager =
            AsyncDieselConnectionManager::<AsyncMysqlConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connect_timeout)
            .build(manager)
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        info!(pool_size = config.pool_size, "MySQL connection pool ready");
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &MysqlPool {
        &self.pool
    }

    /// Get a connection from the pool.
    pub(crate) async fn conn(&self) -> StoreResult<PooledConnection<'_, AsyncMysqlConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}
