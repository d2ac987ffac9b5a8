//! Connection pool wrapper and entry point for all store operations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, instrument};

use crate::config::DatabaseConfig;
use crate::error::{map_sqlx_error, StoreResult};
use crate::queries::PoolQueries;

/// Postgres-backed ledger store.
///
/// ## Thread Safety
///
/// `Store` is cheap to clone and `Send + Sync`; clones share one SQLx pool.
/// Independent transfers run on independent pooled connections. No
/// application-level locks are taken: isolation is delegated to Postgres.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Create a Store around an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database with the given configuration.
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Creating connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        debug!("Connection pool created");

        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Handle whose operations each run as their own implicit transaction.
    pub fn queries(&self) -> PoolQueries {
        PoolQueries::new(self.pool.clone())
    }

    /// Check if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
