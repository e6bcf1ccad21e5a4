//! PostgreSQL connection pool management.
//!
//! # Security Features
//! - Every pooled session is forced read-only
//! - A server-side `statement_timeout` is applied to every new connection
//!   and re-armed before every query
//! - Connection strings are redacted in all logs and error messages

use crate::adapters::helpers::{Operation, classify_sqlx_error};
use crate::adapters::pool::PoolCache;
use crate::adapters::{ConnectionProvider, PoolStats};
use crate::config::{ConnectionConfig, PoolSettings, QuerySettings};
use crate::error::{GatewayError, redact_database_url};
use crate::models::DatabaseType;
use crate::Result;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};

const APPLICATION_NAME: &str = concat!("sqlgate-", env!("CARGO_PKG_VERSION"));

/// Session statement that arms the server-side statement timeout.
pub(crate) fn statement_timeout_sql(timeout_ms: u64) -> String {
    format!("SET statement_timeout = {}", timeout_ms)
}

/// PostgreSQL pools, one per normalized connection URL.
pub struct PostgresConnections {
    pools: PoolCache<Postgres>,
    pool_settings: PoolSettings,
    statement_timeout_ms: u64,
}

impl std::fmt::Debug for PostgresConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnections")
            .field("pool_settings", &self.pool_settings)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl PostgresConnections {
    pub fn new(pool_settings: PoolSettings, query: &QuerySettings) -> Self {
        Self {
            pools: PoolCache::default(),
            pool_settings,
            statement_timeout_ms: query.statement_timeout_ms,
        }
    }

    /// Returns the pool for `url`, creating it on first use.
    ///
    /// `postgres://` and `postgresql://` spellings of the same URL share a
    /// pool. Creation is lazy: no connection is opened until first acquire.
    ///
    /// # Errors
    /// Returns error if the URL is not a valid PostgreSQL connection string
    /// or its pool sizing is out of bounds.
    pub async fn get_pool(&self, url: &str) -> Result<PgPool> {
        let key = DatabaseType::PostgreSQL.normalize_url(url);
        self.pools.get_or_create(&key, || self.create_pool(url)).await
    }

    /// Creates a connection pool with session security settings
    ///
    /// # Connection Pool Configuration
    /// - Max/min connections: from settings, overridable per URL
    /// - Acquire timeout: `PoolExhausted` once exceeded
    /// - Idle timeout and max lifetime: from settings
    /// - Connection validation: enabled
    /// - Session settings: applied to every new connection
    fn create_pool(&self, url: &str) -> Result<PgPool> {
        let config = ConnectionConfig::from_url(url, &self.pool_settings)?;
        if config.database_type != DatabaseType::PostgreSQL {
            return Err(GatewayError::invalid_connection(format!(
                "Not a PostgreSQL connection string: {}",
                redact_database_url(url)
            )));
        }
        let dsn = config.to_dsn()?;
        let statement_timeout_ms = self.statement_timeout_ms;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_pool_size)
            .min_connections(config.min_pool_size)
            .acquire_timeout(self.pool_settings.acquire_timeout())
            .idle_timeout(self.pool_settings.idle_timeout())
            .max_lifetime(self.pool_settings.max_lifetime())
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    use sqlx::Executor;

                    conn.execute(statement_timeout_sql(statement_timeout_ms).as_str())
                        .await?;
                    conn.execute("SET default_transaction_read_only = on").await?;
                    conn.execute(format!("SET application_name = '{}'", APPLICATION_NAME).as_str())
                        .await?;
                    conn.execute("SET timezone = 'UTC'").await?;
                    Ok(())
                })
            })
            .connect_lazy(&dsn)
            .map_err(|e| {
                classify_sqlx_error(
                    e,
                    &format!(
                        "Failed to create PostgreSQL connection pool to {}",
                        redact_database_url(url)
                    ),
                    Operation::Connect,
                )
            })?;

        tracing::info!(
            target = %config,
            min_connections = config.min_pool_size,
            max_connections = config.max_pool_size,
            "Created PostgreSQL connection pool"
        );
        Ok(pool)
    }

    /// Acquires a connection from the pool for `url`.
    ///
    /// Suspends while the pool is at capacity, up to the acquire timeout.
    ///
    /// # Errors
    /// `PoolExhausted` when the acquire times out, `AuthenticationFailed`
    /// or `ConnectionFailed` when a new connection cannot be opened.
    pub async fn acquire(&self, url: &str) -> Result<PoolConnection<Postgres>> {
        let pool = self.get_pool(url).await?;
        pool.acquire().await.map_err(|e| {
            classify_sqlx_error(
                e,
                &format!("PostgreSQL connection to {}", redact_database_url(url)),
                Operation::Connect,
            )
        })
    }

    /// Runs `sql` with bound `args` and returns every row.
    pub async fn execute(&self, url: &str, sql: &str, args: PgArguments) -> Result<Vec<PgRow>> {
        self.fetch_all(
            url,
            sql,
            args,
            Operation::Query {
                sql,
                timeout_ms: self.statement_timeout_ms,
            },
        )
        .await
    }

    pub(crate) async fn fetch_all(
        &self,
        url: &str,
        sql: &str,
        args: PgArguments,
        operation: Operation<'_>,
    ) -> Result<Vec<PgRow>> {
        let pool = self.get_pool(url).await?;
        sqlx::query_with(sql, args)
            .fetch_all(&pool)
            .await
            .map_err(|e| classify_sqlx_error(e, "PostgreSQL statement failed", operation))
    }
}

#[async_trait]
impl ConnectionProvider for PostgresConnections {
    async fn test_connection(&self, url: &str) -> bool {
        let pool = match self.get_pool(url).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "PostgreSQL connection test failed");
                return false;
            }
        };

        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await {
            Ok(value) => value == 1,
            Err(e) => {
                tracing::warn!(
                    url = %redact_database_url(url),
                    error = %e,
                    "PostgreSQL connection test failed"
                );
                false
            }
        }
    }

    async fn close_pool(&self, url: &str) {
        let key = DatabaseType::PostgreSQL.normalize_url(url);
        if self.pools.close(&key).await {
            tracing::info!(url = %redact_database_url(url), "Closed PostgreSQL connection pool");
        }
    }

    async fn close_all(&self) {
        let closed = self.pools.close_all().await;
        if closed > 0 {
            tracing::info!(pools = closed, "Closed all PostgreSQL connection pools");
        }
    }

    async fn pool_stats(&self, url: &str) -> Option<PoolStats> {
        self.pools
            .stats(&DatabaseType::PostgreSQL.normalize_url(url))
            .await
    }
}
