// Postgres connection pool
// Decision: Build the pool lazily so construction never touches the network;
// the startup sequencer decides when connectivity is checked

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::{Persistence, StorageError};

/// Pool settings
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection, including the first connect
    pub acquire_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pool for `database_url` without connecting yet.
    pub fn connect_lazy(
        database_url: &str,
        options: &DatabaseOptions,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_lazy(database_url)
            .map_err(StorageError::Configuration)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for Database {
    async fn init_db(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Connectivity)?;

        tracing::debug!(
            connections = self.pool.size(),
            "Database connectivity confirmed"
        );
        Ok(())
    }
}
