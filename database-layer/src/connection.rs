// Credential store connection management
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, DatabaseResult};
use crate::schema;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use tracing::{info, warn};

/// Connection pool over the credential store.
///
/// Every connection runs with write-ahead journaling, so readers never block
/// the single writer, and with foreign keys enforced. Writers that find the
/// database locked wait up to the configured busy timeout.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    /// Open the pool without touching the schema
    pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        // An in-memory database lives and dies with its connection
        let (max_connections, min_connections) = if config.is_in_memory() {
            (1, 1)
        } else {
            (config.max_connections.max(1), 1)
        };

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        info!(max_connections, "Credential store connection pool created");

        Ok(Self { pool })
    }

    /// Open the pool and bring the schema up to date
    pub async fn open(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let store = Self::connect(config).await?;
        schema::run_migrations(&store).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> DatabaseResult<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(|e| {
            DatabaseError::QueryFailed(format!("Failed to begin transaction: {e}"))
        })
    }

    pub async fn acquire(&self) -> DatabaseResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Check if the pool is healthy
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Credential store health check failed: {}", e);
                false
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Credential store connection pool closed");
    }
}
