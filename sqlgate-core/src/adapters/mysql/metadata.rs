//! MySQL catalog introspection over `information_schema`.
//!
//! Every query is scoped to `DATABASE()`, the schema named in the
//! connection URL. Text columns are cast to `CHAR` because several
//! `information_schema` columns report a binary collation, and numbers to
//! `SIGNED` so they decode as `i64` on every server version.

use super::MySqlConnections;
use crate::Result;
use crate::adapters::MetadataProvider;
use crate::adapters::helpers::{Operation, RowExt};
use crate::metadata::{
    CatalogRows, ColumnRow, ForeignKeyRow, IndexRow, PrimaryKeyRow, TableRow, ViewRow,
    assemble_snapshot,
};
use crate::models::{DatabaseType, SchemaSnapshot};
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use std::sync::Arc;

const TABLES_QUERY: &str = r#"
    SELECT
        CAST(TABLE_SCHEMA AS CHAR) AS schema_name,
        CAST(TABLE_NAME AS CHAR) AS table_name,
        CAST(NULLIF(TABLE_COMMENT, '') AS CHAR) AS table_comment,
        CAST(TABLE_ROWS AS SIGNED) AS estimated_rows
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(TABLE_SCHEMA AS CHAR) AS schema_name,
        CAST(TABLE_NAME AS CHAR) AS table_name,
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(COLUMN_TYPE AS CHAR) AS data_type,
        CAST(IS_NULLABLE = 'YES' AS SIGNED) AS is_nullable,
        CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
        CAST(NULLIF(COLUMN_COMMENT, '') AS CHAR) AS column_comment,
        CAST(ORDINAL_POSITION AS SIGNED) AS ordinal_position
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

const STATISTICS_QUERY: &str = r#"
    SELECT
        CAST(TABLE_SCHEMA AS CHAR) AS schema_name,
        CAST(TABLE_NAME AS CHAR) AS table_name,
        CAST(INDEX_NAME AS CHAR) AS index_name,
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(NON_UNIQUE AS SIGNED) AS non_unique,
        CAST(INDEX_TYPE AS CHAR) AS index_type
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
        CAST(TABLE_SCHEMA AS CHAR) AS schema_name,
        CAST(TABLE_NAME AS CHAR) AS table_name,
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(REFERENCED_TABLE_SCHEMA AS CHAR) AS foreign_schema,
        CAST(REFERENCED_TABLE_NAME AS CHAR) AS foreign_table,
        CAST(REFERENCED_COLUMN_NAME AS CHAR) AS foreign_column,
        CAST(ORDINAL_POSITION AS SIGNED) AS position
    FROM information_schema.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = DATABASE()
      AND REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
"#;

const VIEWS_QUERY: &str = r#"
    SELECT
        CAST(TABLE_SCHEMA AS CHAR) AS schema_name,
        CAST(TABLE_NAME AS CHAR) AS view_name,
        CAST(VIEW_DEFINITION AS CHAR) AS view_definition
    FROM information_schema.VIEWS
    WHERE TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME
"#;

/// MySQL reports the primary key as an index named `PRIMARY`.
const PRIMARY_INDEX: &str = "PRIMARY";

/// One row of `information_schema.STATISTICS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatisticsRow {
    pub schema: String,
    pub table: String,
    pub index_name: String,
    /// `None` for functional key parts
    pub column: Option<String>,
    pub non_unique: bool,
    pub index_type: Option<String>,
}

/// Folds per-column statistics rows into indexes and primary key columns.
///
/// Rows must arrive ordered by table, index and position within the index.
pub(crate) fn group_statistics(rows: Vec<StatisticsRow>) -> (Vec<IndexRow>, Vec<PrimaryKeyRow>) {
    let mut indexes: Vec<IndexRow> = Vec::new();
    let mut primary_keys = Vec::new();

    for row in rows {
        let is_primary = row.index_name == PRIMARY_INDEX;
        if is_primary && let Some(column) = &row.column {
            primary_keys.push(PrimaryKeyRow {
                schema: row.schema.clone(),
                table: row.table.clone(),
                column: column.clone(),
            });
        }

        match indexes.last_mut() {
            Some(last)
                if last.schema == row.schema
                    && last.table == row.table
                    && last.name == row.index_name =>
            {
                last.columns.extend(row.column);
            }
            _ => indexes.push(IndexRow {
                columns: row.column.into_iter().collect(),
                is_unique: !row.non_unique,
                is_primary,
                index_type: row.index_type,
                schema: row.schema,
                table: row.table,
                name: row.index_name,
            }),
        }
    }

    (indexes, primary_keys)
}

/// Reads MySQL catalogs into schema snapshots.
#[derive(Debug)]
pub struct MySqlMetadata {
    connections: Arc<MySqlConnections>,
}

impl MySqlMetadata {
    pub fn new(connections: Arc<MySqlConnections>) -> Self {
        Self { connections }
    }

    async fn catalog(&self, url: &str, sql: &str) -> Result<Vec<MySqlRow>> {
        self.connections
            .fetch_all(url, sql, MySqlArguments::default(), Operation::Metadata)
            .await
    }

    async fn tables(&self, url: &str) -> Result<Vec<TableRow>> {
        self.catalog(url, TABLES_QUERY)
            .await?
            .iter()
            .map(|row| {
                Ok(TableRow {
                    schema: row.get_field("schema_name", "TABLES")?,
                    name: row.get_field("table_name", "TABLES")?,
                    comment: row.get_field("table_comment", "TABLES")?,
                    estimated_rows: row.get_field("estimated_rows", "TABLES")?,
                })
            })
            .collect()
    }

    async fn columns(&self, url: &str) -> Result<Vec<ColumnRow>> {
        self.catalog(url, COLUMNS_QUERY)
            .await?
            .iter()
            .map(|row| {
                let is_nullable: i64 = row.get_field("is_nullable", "COLUMNS")?;
                Ok(ColumnRow {
                    schema: row.get_field("schema_name", "COLUMNS")?,
                    table: row.get_field("table_name", "COLUMNS")?,
                    name: row.get_field("column_name", "COLUMNS")?,
                    data_type: row.get_field("data_type", "COLUMNS")?,
                    is_nullable: is_nullable != 0,
                    default_value: row.get_field("column_default", "COLUMNS")?,
                    comment: row.get_field("column_comment", "COLUMNS")?,
                    ordinal: row.get_field("ordinal_position", "COLUMNS")?,
                })
            })
            .collect()
    }

    async fn statistics(&self, url: &str) -> Result<Vec<StatisticsRow>> {
        self.catalog(url, STATISTICS_QUERY)
            .await?
            .iter()
            .map(|row| {
                let non_unique: i64 = row.get_field("non_unique", "STATISTICS")?;
                Ok(StatisticsRow {
                    schema: row.get_field("schema_name", "STATISTICS")?,
                    table: row.get_field("table_name", "STATISTICS")?,
                    index_name: row.get_field("index_name", "STATISTICS")?,
                    column: row.get_field("column_name", "STATISTICS")?,
                    non_unique: non_unique != 0,
                    index_type: row.get_field("index_type", "STATISTICS")?,
                })
            })
            .collect()
    }

    async fn foreign_keys(&self, url: &str) -> Result<Vec<ForeignKeyRow>> {
        self.catalog(url, FOREIGN_KEYS_QUERY)
            .await?
            .iter()
            .map(|row| {
                Ok(ForeignKeyRow {
                    constraint_name: row.get_field("constraint_name", "KEY_COLUMN_USAGE")?,
                    schema: row.get_field("schema_name", "KEY_COLUMN_USAGE")?,
                    table: row.get_field("table_name", "KEY_COLUMN_USAGE")?,
                    column: row.get_field("column_name", "KEY_COLUMN_USAGE")?,
                    foreign_schema: row.get_field("foreign_schema", "KEY_COLUMN_USAGE")?,
                    foreign_table: row.get_field("foreign_table", "KEY_COLUMN_USAGE")?,
                    foreign_column: row.get_field("foreign_column", "KEY_COLUMN_USAGE")?,
                    position: row.get_field("position", "KEY_COLUMN_USAGE")?,
                })
            })
            .collect()
    }

    async fn views(&self, url: &str) -> Result<Vec<ViewRow>> {
        self.catalog(url, VIEWS_QUERY)
            .await?
            .iter()
            .map(|row| {
                Ok(ViewRow {
                    schema: row.get_field("schema_name", "VIEWS")?,
                    name: row.get_field("view_name", "VIEWS")?,
                    definition: row.get_field("view_definition", "VIEWS")?,
                    comment: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MetadataProvider for MySqlMetadata {
    async fn fetch_metadata(&self, database_name: &str, url: &str) -> Result<SchemaSnapshot> {
        tracing::debug!(database = database_name, "Running MySQL catalog battery");

        let (tables, columns, statistics, foreign_keys, views) = futures::try_join!(
            self.tables(url),
            self.columns(url),
            self.statistics(url),
            self.foreign_keys(url),
            self.views(url),
        )?;
        let (indexes, primary_keys) = group_statistics(statistics);

        // Enum types are per-column in MySQL and already visible in COLUMN_TYPE
        Ok(assemble_snapshot(
            database_name,
            DatabaseType::MySQL,
            CatalogRows {
                tables,
                columns,
                primary_keys,
                foreign_keys,
                indexes,
                views,
                enums: Vec::new(),
            },
        ))
    }
}
