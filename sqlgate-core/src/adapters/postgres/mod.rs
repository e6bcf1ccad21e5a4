//! PostgreSQL adapter.
//!
//! # Security Guarantees
//! - Pooled sessions run with `default_transaction_read_only = on`
//! - `statement_timeout` is set on every new connection
//! - Connection strings are redacted in all logs and error messages

mod connection;
mod executor;
mod metadata;
mod type_mapping;


pub use connection::PostgresConnections;
pub use executor::PostgresExecutor;
pub use metadata::PostgresMetadata;
pub use type_mapping::PostgresTypeMapper;

use crate::Result;
use crate::adapters::{AdapterParts, DialectAdapter};
use crate::config::GatewaySettings;
use crate::models::DatabaseType;
use std::sync::Arc;

/// Builds the PostgreSQL adapter.
///
/// One connection manager is shared by the metadata provider and the
/// executor so that catalog queries and caller SQL draw from the same pools.
///
/// # Errors
/// Returns error if `settings` fail validation.
pub fn build_adapter(settings: &GatewaySettings) -> Result<DialectAdapter> {
    settings.validate()?;

    let connections = Arc::new(PostgresConnections::new(
        settings.pool.clone(),
        &settings.query,
    ));
    let parts = AdapterParts {
        connections: connections.clone(),
        metadata: Arc::new(PostgresMetadata::new(Arc::clone(&connections))),
        executor: Arc::new(PostgresExecutor::new(
            connections,
            settings.query.statement_timeout_ms,
        )),
        types: Arc::new(PostgresTypeMapper),
    };

    Ok(DialectAdapter::new(DatabaseType::PostgreSQL, parts, settings))
}
