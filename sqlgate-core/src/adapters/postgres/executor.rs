//! PostgreSQL execution of validated statements.

use super::PostgresConnections;
use super::connection::statement_timeout_sql;
use super::type_mapping::decode_row;
use crate::Result;
use crate::adapters::helpers::{Operation, classify_sqlx_error};
use crate::adapters::{QueryExecutor, RawColumn, RawRowSet};
use async_trait::async_trait;
use sqlx::postgres::PgColumn;
use sqlx::{Column, Executor, Row, Statement, TypeInfo};
use std::sync::Arc;

#[derive(Debug)]
pub struct PostgresExecutor {
    connections: Arc<PostgresConnections>,
    statement_timeout_ms: u64,
}

impl PostgresExecutor {
    pub fn new(connections: Arc<PostgresConnections>, statement_timeout_ms: u64) -> Self {
        Self {
            connections,
            statement_timeout_ms,
        }
    }
}

fn describe(columns: &[PgColumn]) -> Vec<RawColumn> {
    columns
        .iter()
        .map(|column| RawColumn {
            name: column.name().to_string(),
            type_name: column.type_info().name().to_string(),
        })
        .collect()
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn run(&self, url: &str, sql: &str) -> Result<RawRowSet> {
        let operation = Operation::Query {
            sql,
            timeout_ms: self.statement_timeout_ms,
        };
        let mut conn = self.connections.acquire(url).await?;

        // Session settings persist across checkouts; re-arm the timeout per query
        (&mut *conn)
            .execute(statement_timeout_sql(self.statement_timeout_ms).as_str())
            .await
            .map_err(|e| {
                classify_sqlx_error(e, "Failed to set PostgreSQL statement timeout", operation)
            })?;

        let rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| classify_sqlx_error(e, "PostgreSQL query failed", operation))?;

        let columns = match rows.first() {
            Some(row) => describe(row.columns()),
            // No rows to read the shape from; describe the statement instead
            None => {
                let statement = (&mut *conn)
                    .prepare(sql)
                    .await
                    .map_err(|e| classify_sqlx_error(e, "PostgreSQL describe failed", operation))?;
                describe(statement.columns())
            }
        };

        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| classify_sqlx_error(e, "Failed to decode PostgreSQL row", operation))?;

        Ok(RawRowSet { columns, rows })
    }
}
