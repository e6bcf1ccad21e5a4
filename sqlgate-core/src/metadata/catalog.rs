//! Flat catalog rows and their assembly into a [`SchemaSnapshot`].
//!
//! Dialect providers run their catalog battery and hand back plain rows;
//! [`assemble_snapshot`] joins them by `(schema, table)` without touching
//! the database again.

use crate::models::{
    ColumnInfo, DatabaseType, EnumTypeInfo, ForeignKeyRelation, IndexInfo, SchemaSnapshot,
    TableInfo, ViewInfo,
};
use std::collections::{BTreeMap, HashMap, HashSet};

type Key = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub schema: String,
    pub name: String,
    pub comment: Option<String>,
    pub estimated_rows: Option<i64>,
}

/// One column of a table or view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
    pub ordinal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyRow {
    pub schema: String,
    pub table: String,
    pub column: String,
}

/// One column pair of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRow {
    pub constraint_name: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub foreign_schema: String,
    pub foreign_table: String,
    pub foreign_column: String,
    /// 1-based position within the constraint
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub schema: String,
    pub name: String,
    pub definition: Option<String>,
    pub comment: Option<String>,
}

/// One enum label; labels arrive in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumRow {
    pub schema: String,
    pub type_name: String,
    pub label: String,
}

/// Everything one catalog battery returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRows {
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub primary_keys: Vec<PrimaryKeyRow>,
    pub foreign_keys: Vec<ForeignKeyRow>,
    pub indexes: Vec<IndexRow>,
    pub views: Vec<ViewRow>,
    pub enums: Vec<EnumRow>,
}

fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", schema, name)
}

/// Joins catalog rows into one immutable snapshot.
///
/// Columns are ordered by ordinal position. Rows naming a table or view
/// the battery did not return are dropped.
pub fn assemble_snapshot(
    database_name: &str,
    database_type: DatabaseType,
    rows: CatalogRows,
) -> SchemaSnapshot {
    let CatalogRows {
        tables,
        mut columns,
        primary_keys,
        foreign_keys,
        indexes,
        views,
        enums,
    } = rows;

    let primary: HashSet<(String, String, String)> = primary_keys
        .into_iter()
        .map(|pk| (pk.schema, pk.table, pk.column))
        .collect();

    let mut references: HashMap<(String, String, String), (String, String)> = HashMap::new();
    for fk in &foreign_keys {
        references
            .entry((fk.schema.clone(), fk.table.clone(), fk.column.clone()))
            .or_insert_with(|| {
                (
                    qualified(&fk.foreign_schema, &fk.foreign_table),
                    fk.foreign_column.clone(),
                )
            });
    }

    columns.sort_by(|a, b| {
        (&a.schema, &a.table, a.ordinal).cmp(&(&b.schema, &b.table, b.ordinal))
    });

    let mut columns_by_table: HashMap<Key, Vec<ColumnInfo>> = HashMap::new();
    for row in columns {
        let pk_key = (row.schema.clone(), row.table.clone(), row.name.clone());
        let reference = references.get(&pk_key).cloned();
        let column = ColumnInfo {
            is_primary_key: primary.contains(&pk_key),
            is_foreign_key: reference.is_some(),
            foreign_table: reference.as_ref().map(|(table, _)| table.clone()),
            foreign_column: reference.map(|(_, column)| column),
            is_nullable: row.is_nullable,
            default_value: row.default_value,
            comment: row.comment,
            ..ColumnInfo::new(row.name, row.data_type)
        };
        columns_by_table
            .entry((row.schema, row.table))
            .or_default()
            .push(column);
    }

    let mut indexes_by_table: HashMap<Key, Vec<IndexInfo>> = HashMap::new();
    for row in indexes {
        indexes_by_table
            .entry((row.schema, row.table))
            .or_default()
            .push(IndexInfo {
                name: row.name,
                columns: row.columns,
                is_unique: row.is_unique,
                is_primary: row.is_primary,
                index_type: row.index_type,
            });
    }

    let mut snapshot = SchemaSnapshot::new(database_name, database_type);

    snapshot.tables = tables
        .into_iter()
        .map(|row| {
            let key = (row.schema.clone(), row.name.clone());
            TableInfo {
                columns: columns_by_table.remove(&key).unwrap_or_default(),
                indexes: indexes_by_table.remove(&key).unwrap_or_default(),
                comment: row.comment,
                estimated_row_count: row.estimated_rows.filter(|rows| *rows >= 0),
                schema_name: row.schema,
                name: row.name,
            }
        })
        .collect();

    snapshot.views = views
        .into_iter()
        .map(|row| {
            let key = (row.schema.clone(), row.name.clone());
            ViewInfo {
                columns: columns_by_table.remove(&key).unwrap_or_default(),
                definition: row.definition,
                comment: row.comment,
                schema_name: row.schema,
                name: row.name,
            }
        })
        .collect();

    snapshot.enum_types = group_enums(enums);
    snapshot.foreign_key_relations = group_foreign_keys(foreign_keys);
    snapshot
}

fn group_enums(rows: Vec<EnumRow>) -> Vec<EnumTypeInfo> {
    let mut enums: Vec<EnumTypeInfo> = Vec::new();
    for row in rows {
        match enums.last_mut() {
            Some(last) if last.schema_name == row.schema && last.name == row.type_name => {
                last.values.push(row.label);
            }
            _ => enums.push(EnumTypeInfo {
                schema_name: row.schema,
                name: row.type_name,
                values: vec![row.label],
            }),
        }
    }
    enums
}

fn group_foreign_keys(rows: Vec<ForeignKeyRow>) -> Vec<ForeignKeyRelation> {
    let mut grouped: BTreeMap<(String, String, String), Vec<ForeignKeyRow>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((
                row.schema.clone(),
                row.table.clone(),
                row.constraint_name.clone(),
            ))
            .or_default()
            .push(row);
    }

    grouped
        .into_iter()
        .filter_map(|((schema, table, constraint_name), mut pairs)| {
            pairs.sort_by_key(|pair| pair.position);
            let first = pairs.first()?;
            Some(ForeignKeyRelation {
                from_table: qualified(&schema, &table),
                to_table: qualified(&first.foreign_schema, &first.foreign_table),
                from_columns: pairs.iter().map(|p| p.column.clone()).collect(),
                to_columns: pairs.iter().map(|p| p.foreign_column.clone()).collect(),
                constraint_name,
            })
        })
        .collect()
}
