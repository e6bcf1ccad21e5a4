//! MySQL adapter.
//!
//! # Security Guarantees
//! - Pooled sessions run `SET SESSION TRANSACTION READ ONLY`
//! - `max_execution_time` is set on every new connection
//! - Connection strings are redacted in all logs and error messages

mod connection;
mod executor;
mod metadata;
mod type_mapping;


pub use connection::MySqlConnections;
pub use executor::MySqlExecutor;
pub use metadata::MySqlMetadata;
pub use type_mapping::MySqlTypeMapper;

use crate::Result;
use crate::adapters::{AdapterParts, DialectAdapter};
use crate::config::GatewaySettings;
use crate::models::DatabaseType;
use std::sync::Arc;

/// Builds the MySQL adapter.
///
/// # Errors
/// Returns error if `settings` fail validation.
pub fn build_adapter(settings: &GatewaySettings) -> Result<DialectAdapter> {
    settings.validate()?;

    let connections = Arc::new(MySqlConnections::new(settings.pool.clone(), &settings.query));
    let parts = AdapterParts {
        connections: connections.clone(),
        metadata: Arc::new(MySqlMetadata::new(Arc::clone(&connections))),
        executor: Arc::new(MySqlExecutor::new(
            connections,
            settings.query.statement_timeout_ms,
        )),
        types: Arc::new(MySqlTypeMapper),
    };

    Ok(DialectAdapter::new(DatabaseType::MySQL, parts, settings))
}
