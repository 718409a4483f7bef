//! Database connection pool management.

use crate::tx::TxSource;
use async_trait::async_trait;
use bastion_config::DatabaseConfig;
use bastion_core::{BastionError, BastionResult};
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions};
use sqlx::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const READ_ONLY_TX: &str = "START TRANSACTION READ ONLY";

/// MySQL pool wrapper.
pub struct DatabasePool {
    pool: MySqlPool,
}

impl DatabasePool {
    /// Connects a new pool from configuration.
    pub async fn new(config: &DatabaseConfig) -> BastionResult<Self> {
        info!("Connecting to MySQL database...");

        let pool = MySqlPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                BastionError::Database(format!("Failed to connect: {e}"))
            })?;

        info!("MySQL connection pool established");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn with_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn inner(&self) -> &MySqlPool {
        &self.pool
    }

    /// Starts a transaction on a pooled connection.
    pub async fn begin(&self) -> BastionResult<Transaction<'static, MySql>> {
        Ok(self.pool.begin().await?)
    }

    /// Starts a read-only transaction on a pooled connection.
    pub async fn begin_read_only(&self) -> BastionResult<Transaction<'static, MySql>> {
        Ok(self.pool.begin_with(READ_ONLY_TX).await?)
    }

    /// Checks if the database connection is healthy.
    pub async fn health_check(&self) -> BastionResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| BastionError::Database(format!("Health check failed: {e}")))?;
        Ok(())
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> BastionResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BastionError::Database(format!("Migration failed: {e}")))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl TxSource for DatabasePool {
    type Tx = Transaction<'static, MySql>;

    async fn begin(&self) -> BastionResult<Self::Tx> {
        DatabasePool::begin(self).await
    }

    async fn begin_read_only(&self) -> BastionResult<Self::Tx> {
        DatabasePool::begin_read_only(self).await
    }
}

impl std::ops::Deref for DatabasePool {
    type Target = MySqlPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

/// Creates a shared database pool.
pub async fn create_pool(config: &DatabaseConfig) -> BastionResult<Arc<DatabasePool>> {
    let pool = DatabasePool::new(config).await?;
    Ok(Arc::new(pool))
}
