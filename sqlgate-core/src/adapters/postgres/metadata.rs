//! PostgreSQL catalog introspection.
//!
//! The battery is seven independent catalog queries run concurrently over
//! the pool. Every value is cast to `text`, `int8` or `bool` server-side so
//! that decoding never depends on catalog-specific types such as `name` or
//! `oid`.

use super::PostgresConnections;
use crate::Result;
use crate::adapters::MetadataProvider;
use crate::adapters::helpers::{Operation, RowExt};
use crate::metadata::{
    CatalogRows, ColumnRow, EnumRow, ForeignKeyRow, IndexRow, PrimaryKeyRow, TableRow, ViewRow,
    assemble_snapshot,
};
use crate::models::{DatabaseType, SchemaSnapshot};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use std::sync::Arc;

const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema', 'pg_toast')";

fn tables_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            obj_description(c.oid, 'pg_class')::text AS table_comment,
            c.reltuples::int8 AS estimated_rows
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
          AND n.nspname NOT IN {SYSTEM_SCHEMAS}
          AND n.nspname NOT LIKE 'pg_temp_%'
        ORDER BY n.nspname, c.relname
        "#
    )
}

fn columns_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            a.attname::text AS column_name,
            pg_catalog.format_type(a.atttypid, a.atttypmod)::text AS data_type,
            (NOT a.attnotnull) AS is_nullable,
            pg_catalog.pg_get_expr(d.adbin, d.adrelid)::text AS column_default,
            col_description(c.oid, a.attnum)::text AS column_comment,
            a.attnum::int8 AS ordinal_position
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE c.relkind IN ('r', 'p', 'v', 'm')
          AND a.attnum > 0
          AND NOT a.attisdropped
          AND n.nspname NOT IN {SYSTEM_SCHEMAS}
          AND n.nspname NOT LIKE 'pg_temp_%'
        ORDER BY n.nspname, c.relname, a.attnum
        "#
    )
}

fn primary_keys_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            a.attname::text AS column_name
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = ANY(con.conkey)
        WHERE con.contype = 'p'
          AND n.nspname NOT IN {SYSTEM_SCHEMAS}
        "#
    )
}

fn foreign_keys_query() -> String {
    format!(
        r#"
        SELECT
            con.conname::text AS constraint_name,
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            a.attname::text AS column_name,
            fn.nspname::text AS foreign_schema,
            fc.relname::text AS foreign_table,
            fa.attname::text AS foreign_column,
            k.position::int8 AS position
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_class fc ON fc.oid = con.confrelid
        JOIN pg_catalog.pg_namespace fn ON fn.oid = fc.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
            WITH ORDINALITY AS k(attnum, foreign_attnum, position)
        JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        JOIN pg_catalog.pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = k.foreign_attnum
        WHERE con.contype = 'f'
          AND n.nspname NOT IN {SYSTEM_SCHEMAS}
        ORDER BY n.nspname, c.relname, con.conname, k.position
        "#
    )
}

fn indexes_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            t.relname::text AS table_name,
            i.relname::text AS index_name,
            pg_catalog.pg_get_indexdef(ix.indexrelid)::text AS index_definition,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            am.amname::text AS index_type
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_am am ON am.oid = i.relam
        WHERE n.nspname NOT IN {SYSTEM_SCHEMAS}
        ORDER BY n.nspname, t.relname, i.relname
        "#
    )
}

fn views_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS view_name,
            pg_catalog.pg_get_viewdef(c.oid, true)::text AS view_definition,
            obj_description(c.oid, 'pg_class')::text AS view_comment
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('v', 'm')
          AND n.nspname NOT IN {SYSTEM_SCHEMAS}
        ORDER BY n.nspname, c.relname
        "#
    )
}

fn enums_query() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema_name,
            t.typname::text AS type_name,
            e.enumlabel::text AS label
        FROM pg_catalog.pg_type t
        JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname NOT IN {SYSTEM_SCHEMAS}
        ORDER BY n.nspname, t.typname, e.enumsortorder
        "#
    )
}

/// Column list of an index, parsed from `pg_get_indexdef` output.
///
/// `CREATE UNIQUE INDEX users_email_key ON public.users USING btree (email)`
/// yields `["email"]`. Expression entries are kept verbatim and quoted
/// identifiers are unquoted.
pub(crate) fn index_columns(definition: &str) -> Vec<String> {
    let Some(open) = definition.find('(') else {
        return Vec::new();
    };

    let mut depth = 0usize;
    let mut close = None;
    for (offset, ch) in definition[open..].char_indices() {
        match ch {
            '(' => depth = depth.saturating_add(1),
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    close = Some(open.saturating_add(offset));
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return Vec::new();
    };

    let mut columns = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in definition[open.saturating_add(1)..close].chars() {
        match ch {
            '(' => {
                depth = depth.saturating_add(1);
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => columns.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    columns.push(current);

    columns
        .into_iter()
        .map(|column| {
            let column = column.trim();
            match column.strip_prefix('"').and_then(|c| c.strip_suffix('"')) {
                Some(quoted) => quoted.replace("\"\"", "\""),
                None => column.to_string(),
            }
        })
        .filter(|column| !column.is_empty())
        .collect()
}

/// Reads PostgreSQL catalogs into schema snapshots.
#[derive(Debug)]
pub struct PostgresMetadata {
    connections: Arc<PostgresConnections>,
}

impl PostgresMetadata {
    pub fn new(connections: Arc<PostgresConnections>) -> Self {
        Self { connections }
    }

    async fn catalog(&self, url: &str, sql: &str) -> Result<Vec<PgRow>> {
        self.connections
            .fetch_all(url, sql, PgArguments::default(), Operation::Metadata)
            .await
    }

    async fn tables(&self, url: &str) -> Result<Vec<TableRow>> {
        self.catalog(url, &tables_query())
            .await?
            .iter()
            .map(|row| {
                Ok(TableRow {
                    schema: row.get_field("schema_name", "tables")?,
                    name: row.get_field("table_name", "tables")?,
                    comment: row.get_field("table_comment", "tables")?,
                    estimated_rows: row.get_field("estimated_rows", "tables")?,
                })
            })
            .collect()
    }

    async fn columns(&self, url: &str) -> Result<Vec<ColumnRow>> {
        self.catalog(url, &columns_query())
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnRow {
                    schema: row.get_field("schema_name", "columns")?,
                    table: row.get_field("table_name", "columns")?,
                    name: row.get_field("column_name", "columns")?,
                    data_type: row.get_field("data_type", "columns")?,
                    is_nullable: row.get_field("is_nullable", "columns")?,
                    default_value: row.get_field("column_default", "columns")?,
                    comment: row.get_field("column_comment", "columns")?,
                    ordinal: row.get_field("ordinal_position", "columns")?,
                })
            })
            .collect()
    }

    async fn primary_keys(&self, url: &str) -> Result<Vec<PrimaryKeyRow>> {
        self.catalog(url, &primary_keys_query())
            .await?
            .iter()
            .map(|row| {
                Ok(PrimaryKeyRow {
                    schema: row.get_field("schema_name", "primary keys")?,
                    table: row.get_field("table_name", "primary keys")?,
                    column: row.get_field("column_name", "primary keys")?,
                })
            })
            .collect()
    }

    async fn foreign_keys(&self, url: &str) -> Result<Vec<ForeignKeyRow>> {
        self.catalog(url, &foreign_keys_query())
            .await?
            .iter()
            .map(|row| {
                Ok(ForeignKeyRow {
                    constraint_name: row.get_field("constraint_name", "foreign keys")?,
                    schema: row.get_field("schema_name", "foreign keys")?,
                    table: row.get_field("table_name", "foreign keys")?,
                    column: row.get_field("column_name", "foreign keys")?,
                    foreign_schema: row.get_field("foreign_schema", "foreign keys")?,
                    foreign_table: row.get_field("foreign_table", "foreign keys")?,
                    foreign_column: row.get_field("foreign_column", "foreign keys")?,
                    position: row.get_field("position", "foreign keys")?,
                })
            })
            .collect()
    }

    async fn indexes(&self, url: &str) -> Result<Vec<IndexRow>> {
        self.catalog(url, &indexes_query())
            .await?
            .iter()
            .map(|row| {
                let definition: String = row.get_field("index_definition", "indexes")?;
                Ok(IndexRow {
                    schema: row.get_field("schema_name", "indexes")?,
                    table: row.get_field("table_name", "indexes")?,
                    name: row.get_field("index_name", "indexes")?,
                    columns: index_columns(&definition),
                    is_unique: row.get_field("is_unique", "indexes")?,
                    is_primary: row.get_field("is_primary", "indexes")?,
                    index_type: row.get_field("index_type", "indexes")?,
                })
            })
            .collect()
    }

    async fn views(&self, url: &str) -> Result<Vec<ViewRow>> {
        self.catalog(url, &views_query())
            .await?
            .iter()
            .map(|row| {
                Ok(ViewRow {
                    schema: row.get_field("schema_name", "views")?,
                    name: row.get_field("view_name", "views")?,
                    definition: row.get_field("view_definition", "views")?,
                    comment: row.get_field("view_comment", "views")?,
                })
            })
            .collect()
    }

    async fn enums(&self, url: &str) -> Result<Vec<EnumRow>> {
        self.catalog(url, &enums_query())
            .await?
            .iter()
            .map(|row| {
                Ok(EnumRow {
                    schema: row.get_field("schema_name", "enums")?,
                    type_name: row.get_field("type_name", "enums")?,
                    label: row.get_field("label", "enums")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MetadataProvider for PostgresMetadata {
    async fn fetch_metadata(&self, database_name: &str, url: &str) -> Result<SchemaSnapshot> {
        tracing::debug!(database = database_name, "Running PostgreSQL catalog battery");

        let (tables, columns, primary_keys, foreign_keys, indexes, views, enums) = futures::try_join!(
            self.tables(url),
            self.columns(url),
            self.primary_keys(url),
            self.foreign_keys(url),
            self.indexes(url),
            self.views(url),
            self.enums(url),
        )?;

        Ok(assemble_snapshot(
            database_name,
            DatabaseType::PostgreSQL,
            CatalogRows {
                tables,
                columns,
                primary_keys,
                foreign_keys,
                indexes,
                views,
                enums,
            },
        ))
    }
}
