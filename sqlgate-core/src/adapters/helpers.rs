//! Helper utilities shared by the sqlx-backed adapters.
//!
//! Driver errors are classified here, once, into the gateway taxonomy so
//! that no `sqlx::Error` escapes the adapter layer.

use crate::{Result, error::GatewayError};
use sqlx::{ColumnIndex, Row};

/// SQLSTATE for a statement cancelled by `statement_timeout`
const PG_QUERY_CANCELED: &str = "57014";
/// MySQL `ER_QUERY_TIMEOUT` (max_execution_time exceeded)
const MYSQL_QUERY_TIMEOUT: u16 = 3024;
/// MySQL `ER_QUERY_INTERRUPTED`
const MYSQL_QUERY_INTERRUPTED: u16 = 1317;
/// MySQL `ER_ACCESS_DENIED_ERROR`
const MYSQL_ACCESS_DENIED: u16 = 1045;

/// What the driver was doing when it failed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Operation<'a> {
    /// Opening a pool or acquiring a connection
    Connect,
    /// Running a catalog query
    Metadata,
    /// Running caller SQL under a statement timeout
    Query { sql: &'a str, timeout_ms: u64 },
}

/// Maps a driver error onto the gateway taxonomy.
///
/// Transport, TLS and closed-pool errors become `ConnectionFailed`, an
/// acquire timeout becomes `PoolExhausted`, rejected credentials become
/// `AuthenticationFailed` and a server-side statement cancellation becomes
/// `QueryTimeout`. Remaining errors are attributed to the operation.
pub(crate) fn classify_sqlx_error(
    error: sqlx::Error,
    context: &str,
    operation: Operation<'_>,
) -> GatewayError {
    let (is_transport, is_auth, is_timeout) = match &error {
        sqlx::Error::PoolTimedOut => {
            return GatewayError::pool_exhausted(format!(
                "{}: timed out waiting for a pooled connection",
                context
            ));
        }
        sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => (true, false, false),
        sqlx::Error::Database(db_error) => (
            false,
            is_authentication_failure(db_error.as_ref()),
            is_statement_timeout(db_error.as_ref()),
        ),
        _ => (false, false, false),
    };

    if is_transport {
        return GatewayError::connection_failed(context, error);
    }
    if is_auth {
        return GatewayError::authentication_failed(context, error);
    }

    match operation {
        Operation::Query { sql, timeout_ms } if is_timeout => {
            tracing::warn!(timeout_ms, "Statement cancelled by server-side timeout");
            GatewayError::query_timeout(timeout_ms, Some(sql))
        }
        Operation::Query { sql, .. } => GatewayError::query_failed(context, Some(sql), error),
        Operation::Connect => GatewayError::connection_failed(context, error),
        Operation::Metadata => GatewayError::metadata_failed(context, error),
    }
}

fn is_authentication_failure(error: &dyn sqlx::error::DatabaseError) -> bool {
    if matches!(error.code().as_deref(), Some("28P01" | "28000")) {
        return true;
    }
    mysql_error_number(error) == Some(MYSQL_ACCESS_DENIED)
}

fn is_statement_timeout(error: &dyn sqlx::error::DatabaseError) -> bool {
    if error.code().as_deref() == Some(PG_QUERY_CANCELED) {
        return true;
    }
    matches!(
        mysql_error_number(error),
        Some(MYSQL_QUERY_TIMEOUT | MYSQL_QUERY_INTERRUPTED)
    )
}

#[cfg(feature = "mysql")]
fn mysql_error_number(error: &dyn sqlx::error::DatabaseError) -> Option<u16> {
    error
        .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
        .map(sqlx::mysql::MySqlDatabaseError::number)
}

#[cfg(not(feature = "mysql"))]
fn mysql_error_number(_error: &dyn sqlx::error::DatabaseError) -> Option<u16> {
    None
}

/// Extension trait for extracting typed values from catalog rows
/// with consistent error handling.
///
/// # Example
/// ```rust,ignore
/// let name: String = row.get_field("table_name", "tables")?;
/// let comment: Option<String> = row.get_field("table_comment", "tables")?;
/// ```
pub(crate) trait RowExt: Row {
    /// Extracts a typed field, reporting failures as `MetadataFetchFailed`.
    fn get_field<'r, T>(&'r self, field_name: &str, catalog: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, Self::Database> + sqlx::Type<Self::Database>;
}

impl<R> RowExt for R
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
{
    fn get_field<'r, T>(&'r self, field_name: &str, catalog: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, Self::Database> + sqlx::Type<Self::Database>,
    {
        self.try_get(field_name).map_err(|e| {
            GatewayError::metadata_failed(
                format!("Failed to read '{}' from {} catalog", field_name, catalog),
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_pool_timeout_is_pool_exhausted() {
        let error = classify_sqlx_error(sqlx::Error::PoolTimedOut, "acquire", Operation::Connect);
        assert_eq!(error.code(), ErrorCode::PoolExhausted);
    }

    #[test]
    fn test_transport_errors_are_connection_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = classify_sqlx_error(
            sqlx::Error::Io(io),
            "connect",
            Operation::Query {
                sql: "SELECT 1",
                timeout_ms: 1000,
            },
        );
        assert_eq!(error.code(), ErrorCode::ConnectionFailed);

        let error = classify_sqlx_error(sqlx::Error::PoolClosed, "acquire", Operation::Metadata);
        assert_eq!(error.code(), ErrorCode::ConnectionFailed);
    }

    #[test]
    fn test_other_errors_follow_operation() {
        let error = classify_sqlx_error(
            sqlx::Error::RowNotFound,
            "catalog",
            Operation::Metadata,
        );
        assert_eq!(error.code(), ErrorCode::MetadataFetchFailed);

        let error = classify_sqlx_error(
            sqlx::Error::ColumnNotFound("x".to_string()),
            "run",
            Operation::Query {
                sql: "SELECT x",
                timeout_ms: 1000,
            },
        );
        assert_eq!(error.code(), ErrorCode::QueryExecutionFailed);
        assert_eq!(
            error.details(),
            Some(serde_json::json!({ "sql": "SELECT x" }))
        );
    }
}
