//! MySQL connection pool management.
//!
//! # Security Features
//! - Every pooled session is forced read-only
//! - `max_execution_time` bounds every SELECT server-side and is re-armed
//!   before every query
//! - Connection strings are redacted in all logs and error messages

use crate::Result;
use crate::adapters::helpers::{Operation, classify_sqlx_error};
use crate::adapters::pool::PoolCache;
use crate::adapters::{ConnectionProvider, PoolStats};
use crate::config::{ConnectionConfig, PoolSettings, QuerySettings};
use crate::error::{GatewayError, redact_database_url};
use crate::models::DatabaseType;
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;

/// Session statement that arms the server-side SELECT timeout.
pub(crate) fn statement_timeout_sql(timeout_ms: u64) -> String {
    format!("SET SESSION max_execution_time = {}", timeout_ms)
}

/// MySQL pools, one per normalized connection URL.
pub struct MySqlConnections {
    pools: PoolCache<MySql>,
    pool_settings: PoolSettings,
    statement_timeout_ms: u64,
}

impl std::fmt::Debug for MySqlConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnections")
            .field("pool_settings", &self.pool_settings)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl MySqlConnections {
    pub fn new(pool_settings: PoolSettings, query: &QuerySettings) -> Self {
        Self {
            pools: PoolCache::default(),
            pool_settings,
            statement_timeout_ms: query.statement_timeout_ms,
        }
    }

    /// Returns the pool for `url`, creating it lazily on first use.
    ///
    /// # Errors
    /// Returns error if the URL is not a valid MySQL connection string or
    /// its pool sizing is out of bounds.
    pub async fn get_pool(&self, url: &str) -> Result<MySqlPool> {
        let key = DatabaseType::MySQL.normalize_url(url);
        self.pools.get_or_create(&key, || self.create_pool(url)).await
    }

    fn create_pool(&self, url: &str) -> Result<MySqlPool> {
        let config = ConnectionConfig::from_url(url, &self.pool_settings)?;
        if config.database_type != DatabaseType::MySQL {
            return Err(GatewayError::invalid_connection(format!(
                "Not a MySQL connection string: {}",
                redact_database_url(url)
            )));
        }
        let dsn = config.to_dsn()?;
        let statement_timeout_ms = self.statement_timeout_ms;

        let pool = MySqlPoolOptions::new()
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
                    conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                    conn.execute("SET time_zone = '+00:00'").await?;
                    Ok(())
                })
            })
            .connect_lazy(&dsn)
            .map_err(|e| {
                classify_sqlx_error(
                    e,
                    &format!(
                        "Failed to create MySQL connection pool to {}",
                        redact_database_url(url)
                    ),
                    Operation::Connect,
                )
            })?;

        tracing::info!(
            target = %config,
            min_connections = config.min_pool_size,
            max_connections = config.max_pool_size,
            "Created MySQL connection pool"
        );
        Ok(pool)
    }

    /// Acquires a connection from the pool for `url`.
    ///
    /// # Errors
    /// `PoolExhausted` when the acquire times out, `AuthenticationFailed`
    /// or `ConnectionFailed` when a new connection cannot be opened.
    pub async fn acquire(&self, url: &str) -> Result<PoolConnection<MySql>> {
        let pool = self.get_pool(url).await?;
        pool.acquire().await.map_err(|e| {
            classify_sqlx_error(
                e,
                &format!("MySQL connection to {}", redact_database_url(url)),
                Operation::Connect,
            )
        })
    }

    /// Runs `sql` with bound `args` and returns every row.
    pub async fn execute(&self, url: &str, sql: &str, args: MySqlArguments) -> Result<Vec<MySqlRow>> {
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
        args: MySqlArguments,
        operation: Operation<'_>,
    ) -> Result<Vec<MySqlRow>> {
        let pool = self.get_pool(url).await?;
        sqlx::query_with(sql, args)
            .fetch_all(&pool)
            .await
            .map_err(|e| classify_sqlx_error(e, "MySQL statement failed", operation))
    }
}

#[async_trait]
impl ConnectionProvider for MySqlConnections {
    async fn test_connection(&self, url: &str) -> bool {
        let pool = match self.get_pool(url).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "MySQL connection test failed");
                return false;
            }
        };

        match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await {
            Ok(value) => value == 1,
            Err(e) => {
                tracing::warn!(
                    url = %redact_database_url(url),
                    error = %e,
                    "MySQL connection test failed"
                );
                false
            }
        }
    }

    async fn close_pool(&self, url: &str) {
        if self.pools.close(&DatabaseType::MySQL.normalize_url(url)).await {
            tracing::info!(url = %redact_database_url(url), "Closed MySQL connection pool");
        }
    }

    async fn close_all(&self) {
        let closed = self.pools.close_all().await;
        if closed > 0 {
            tracing::info!(pools = closed, "Closed all MySQL connection pools");
        }
    }

    async fn pool_stats(&self, url: &str) -> Option<PoolStats> {
        self.pools.stats(&DatabaseType::MySQL.normalize_url(url)).await
    }
}
