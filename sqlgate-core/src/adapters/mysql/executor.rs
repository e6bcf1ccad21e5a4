//! MySQL execution of validated statements.

use super::MySqlConnections;
use super::connection::statement_timeout_sql;
use super::type_mapping::decode_row;
use crate::Result;
use crate::adapters::helpers::{Operation, classify_sqlx_error};
use crate::adapters::{QueryExecutor, RawColumn, RawRowSet};
use async_trait::async_trait;
use sqlx::mysql::MySqlColumn;
use sqlx::{Column, Executor, Row, Statement, TypeInfo};
use std::sync::Arc;

#[derive(Debug)]
pub struct MySqlExecutor {
    connections: Arc<MySqlConnections>,
    statement_timeout_ms: u64,
}

impl MySqlExecutor {
    pub fn new(connections: Arc<MySqlConnections>, statement_timeout_ms: u64) -> Self {
        Self {
            connections,
            statement_timeout_ms,
        }
    }
}

fn describe(columns: &[MySqlColumn]) -> Vec<RawColumn> {
    columns
        .iter()
        .map(|column| RawColumn {
            name: column.name().to_string(),
            type_name: column.type_info().name().to_string(),
        })
        .collect()
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
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
                classify_sqlx_error(e, "Failed to set MySQL statement timeout", operation)
            })?;

        let rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| classify_sqlx_error(e, "MySQL query failed", operation))?;

        let columns = match rows.first() {
            Some(row) => describe(row.columns()),
            None => {
                let statement = (&mut *conn)
                    .prepare(sql)
                    .await
                    .map_err(|e| classify_sqlx_error(e, "MySQL describe failed", operation))?;
                describe(statement.columns())
            }
        };

        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| classify_sqlx_error(e, "Failed to decode MySQL row", operation))?;

        Ok(RawRowSet { columns, rows })
    }
}
