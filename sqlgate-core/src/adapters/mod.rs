//! Dialect adapters.
//!
//! An adapter is composed from four capabilities, each behind its own trait:
//! - [`ConnectionProvider`]: per-URL pools, connection tests, teardown
//! - [`MetadataProvider`]: the dialect's catalog battery
//! - [`QueryExecutor`]: runs already-validated SQL and decodes cells
//! - [`TypeMapper`]: serializes decoded cells and names column types
//!
//! [`DialectAdapter`] holds one implementation of each together with the
//! dialect's [`SqlValidator`] and a [`SchemaCache`], and owns the
//! validate → limit → execute → serialize sequence so that every dialect
//! runs it identically.
//!
//! # Security Guarantees
//! - Caller SQL is always validated before any connection is acquired
//! - Unbounded SELECTs are capped at `max_rows`
//! - Driver errors are remapped into the gateway taxonomy here

#[cfg(any(feature = "postgresql", feature = "mysql"))]
pub(crate) mod helpers;
#[cfg(any(feature = "postgresql", feature = "mysql"))]
mod pool;
mod type_mapping;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(test)]
mod tests;

pub use type_mapping::{NativeValue, serialize_value};

use crate::config::{GatewaySettings, QuerySettings};
use crate::error::{GatewayError, redact_database_url};
use crate::metadata::SchemaCache;
use crate::models::{DatabaseType, QueryResult, SchemaSnapshot};
use crate::Result;
use crate::validator::{KnownTables, SqlValidator, ValidationVerdict};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Slack granted past the server-side statement timeout before the client
/// gives up on a statement itself.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Pool statistics for monitoring connection pool health and usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Number of idle connections ready to be used
    pub idle_connections: u32,
    /// Number of connections currently in use
    pub active_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum allowed connections (from configuration)
    pub max_connections: u32,
}

impl PoolStats {
    pub(crate) fn from_counts(size: u32, idle: usize, max_connections: u32) -> Self {
        let idle = u32::try_from(idle).unwrap_or(u32::MAX).min(size);
        Self {
            idle_connections: idle,
            active_connections: size.saturating_sub(idle),
            total_connections: size,
            max_connections,
        }
    }
}

/// Name and backend type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub type_name: String,
}

/// Decoded but not yet serialized rows from one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRowSet {
    pub columns: Vec<RawColumn>,
    pub rows: Vec<Vec<NativeValue>>,
}

/// Owns the pools of one dialect, keyed by normalized URL.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquires a connection and runs a trivial round trip; every failure
    /// is reported as `false`.
    async fn test_connection(&self, url: &str) -> bool;

    /// Closes and forgets the pool for `url`, if one exists.
    async fn close_pool(&self, url: &str);

    /// Closes every pool; safe to call repeatedly.
    async fn close_all(&self);

    /// Current counters of the pool for `url`, if one exists.
    async fn pool_stats(&self, url: &str) -> Option<PoolStats>;
}

/// Builds schema snapshots from a dialect's catalog.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_metadata(&self, database_name: &str, url: &str) -> Result<SchemaSnapshot>;
}

/// Runs SQL that has already passed validation.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `sql` and decodes every cell.
    ///
    /// When no rows come back the columns still describe the statement's
    /// result shape.
    async fn run(&self, url: &str, sql: &str) -> Result<RawRowSet>;
}

/// Serializes decoded cells and names column types for one dialect.
pub trait TypeMapper: Send + Sync {
    fn to_json(&self, value: NativeValue) -> JsonValue {
        serialize_value(value)
    }

    /// Display name for a backend type as reported by the driver.
    fn column_type(&self, backend_type: &str) -> String;
}

/// The four capabilities an adapter is assembled from.
#[derive(Clone)]
pub struct AdapterParts {
    pub connections: Arc<dyn ConnectionProvider>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub executor: Arc<dyn QueryExecutor>,
    pub types: Arc<dyn TypeMapper>,
}

/// Connection, metadata, execution and type-mapping behavior for one dialect.
///
/// One instance serves every URL of its dialect; pools and cached schema
/// snapshots are kept per URL inside it.
pub struct DialectAdapter {
    dialect: DatabaseType,
    parts: AdapterParts,
    validator: SqlValidator,
    schemas: SchemaCache,
    query: QuerySettings,
}

impl std::fmt::Debug for DialectAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectAdapter")
            .field("dialect", &self.dialect)
            .field("validator", &self.validator)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl DialectAdapter {
    /// Assembles an adapter with a validator built from `settings`.
    pub fn new(dialect: DatabaseType, parts: AdapterParts, settings: &GatewaySettings) -> Self {
        let validator = SqlValidator::new(dialect, &settings.validator, settings.query.max_rows);
        Self::with_validator(parts, validator, settings.query.clone())
    }

    /// Assembles an adapter around an existing validator.
    pub fn with_validator(parts: AdapterParts, validator: SqlValidator, query: QuerySettings) -> Self {
        Self {
            dialect: validator.dialect(),
            parts,
            validator,
            schemas: SchemaCache::new(),
            query,
        }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    pub fn query_settings(&self) -> &QuerySettings {
        &self.query
    }

    fn cache_key(&self, url: &str) -> String {
        self.dialect.normalize_url(url)
    }

    /// Whether `url` is reachable; never fails.
    pub async fn test_connection(&self, url: &str) -> bool {
        self.parts.connections.test_connection(url).await
    }

    /// Runs the catalog battery and installs the result as the current
    /// snapshot for `url`.
    pub async fn fetch_metadata(&self, database_name: &str, url: &str) -> Result<Arc<SchemaSnapshot>> {
        let started = Instant::now();
        let snapshot = self.parts.metadata.fetch_metadata(database_name, url).await?;
        let snapshot = self.schemas.install(&self.cache_key(url), snapshot).await;

        tracing::info!(
            dialect = %self.dialect,
            database = database_name,
            url = %redact_database_url(url),
            tables = snapshot.tables.len(),
            views = snapshot.views.len(),
            elapsed_ms = elapsed_ms(started),
            "Schema metadata refreshed"
        );
        Ok(snapshot)
    }

    /// Last snapshot fetched for `url`, without touching the database.
    pub async fn cached_metadata(&self, url: &str) -> Option<Arc<SchemaSnapshot>> {
        self.schemas.get(&self.cache_key(url)).await
    }

    /// Cached snapshot for `url`, fetching one first if none exists.
    pub async fn metadata(&self, database_name: &str, url: &str) -> Result<Arc<SchemaSnapshot>> {
        match self.cached_metadata(url).await {
            Some(snapshot) => Ok(snapshot),
            None => self.fetch_metadata(database_name, url).await,
        }
    }

    /// Bare and qualified table names of the cached snapshot for `url`.
    pub async fn known_tables(&self, url: &str) -> Option<KnownTables> {
        self.cached_metadata(url)
            .await
            .map(|snapshot| KnownTables::from(&snapshot.table_names()))
    }

    pub fn validate(&self, sql: &str, known_tables: Option<&KnownTables>) -> ValidationVerdict {
        self.validator.validate(sql, known_tables)
    }

    pub fn validate_sql(&self, sql: &str) -> (bool, Option<String>) {
        self.validator.validate_sql(sql)
    }

    pub fn inject_limit(&self, sql: &str) -> String {
        self.validator.inject_limit(sql)
    }

    /// Validates, caps and runs `sql` against `url`.
    ///
    /// # Errors
    /// - `SqlUnsafe` when validation rejects the statement; nothing is run
    /// - `QueryTimeout` when the statement outlives the configured timeout
    /// - any connection or execution error reported by the executor
    pub async fn execute(&self, url: &str, sql: &str) -> Result<QueryResult> {
        let validated = self.validator.validate(sql, None).into_result()?;
        let limited = self.validator.inject_limit(&validated);
        let limit_injected = limited != validated;

        let started = Instant::now();
        let budget = self.query.statement_timeout().saturating_add(CLIENT_TIMEOUT_GRACE);
        let raw = match tokio::time::timeout(budget, self.parts.executor.run(url, &limited)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.query.statement_timeout_ms,
                    "Statement abandoned after client-side timeout"
                );
                return Err(GatewayError::query_timeout(
                    self.query.statement_timeout_ms,
                    Some(&limited),
                ));
            }
        };
        let execution_time_ms = elapsed_ms(started);

        let RawRowSet { columns, rows } = raw;
        let column_types = columns
            .iter()
            .map(|c| self.parts.types.column_type(&c.type_name))
            .collect();
        let column_names = columns.into_iter().map(|c| c.name).collect();
        let rows: Vec<Vec<JsonValue>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| self.parts.types.to_json(v)).collect())
            .collect();

        let row_count = u64::try_from(rows.len()).unwrap_or(u64::MAX);
        let truncated = limit_injected && row_count >= self.validator.max_rows();

        let result = QueryResult::new(column_names, column_types, rows, truncated, execution_time_ms)?;
        tracing::debug!(
            dialect = %self.dialect,
            rows = result.row_count(),
            truncated,
            execution_time_ms,
            "Query executed"
        );
        Ok(result)
    }

    /// [`Self::execute`] with the database name recorded on the log span.
    pub async fn execute_query(&self, database_name: &str, url: &str, sql: &str) -> Result<QueryResult> {
        let span = tracing::info_span!("execute_query", database = database_name, dialect = %self.dialect);
        self.execute(url, sql).instrument(span).await
    }

    pub async fn pool_stats(&self, url: &str) -> Option<PoolStats> {
        self.parts.connections.pool_stats(url).await
    }

    /// Closes the pool for `url` and forgets its cached snapshot.
    pub async fn close_pool(&self, url: &str) {
        self.parts.connections.close_pool(url).await;
        self.schemas.invalidate(&self.cache_key(url)).await;
    }

    /// Closes every pool and clears the schema cache; idempotent.
    pub async fn close(&self) {
        self.parts.connections.close_all().await;
        self.schemas.clear().await;
    }
}

/// Milliseconds elapsed since `started`, saturating.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
