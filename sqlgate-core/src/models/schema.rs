//! Schema snapshot types and their text rendering.

use super::DatabaseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Database column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
    /// Schema-qualified table referenced by a foreign key on this column
    pub foreign_table: Option<String>,
    pub foreign_column: Option<String>,
}

impl ColumnInfo {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            is_foreign_key: false,
            default_value: None,
            comment: None,
            foreign_table: None,
            foreign_column: None,
        }
    }
}

/// Database index information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: Option<String>,
}

/// Database table information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema_name: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub comment: Option<String>,
    /// Planner estimate; absent when the catalog has no statistics yet
    pub estimated_row_count: Option<i64>,
}

impl TableInfo {
    /// Gets the schema-qualified name
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }
}

/// Database view information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub schema_name: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub definition: Option<String>,
    pub comment: Option<String>,
}

impl ViewInfo {
    /// Gets the schema-qualified name
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }
}

/// Enumerated type and its labels in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTypeInfo {
    pub schema_name: String,
    pub name: String,
    pub values: Vec<String>,
}

/// Foreign key relationship, one per constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRelation {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
    pub constraint_name: String,
}

/// Immutable point-in-time description of one database.
///
/// A snapshot is built in full by a metadata provider and then shared
/// behind an `Arc`; refreshing produces a new snapshot rather than
/// editing this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub database_name: String,
    pub database_type: DatabaseType,
    pub tables: Vec<TableInfo>,
    pub views: Vec<ViewInfo>,
    pub enum_types: Vec<EnumTypeInfo>,
    pub foreign_key_relations: Vec<ForeignKeyRelation>,
    pub fetched_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot stamped with the current time.
    pub fn new(database_name: impl Into<String>, database_type: DatabaseType) -> Self {
        Self {
            database_name: database_name.into(),
            database_type,
            tables: Vec::new(),
            views: Vec::new(),
            enum_types: Vec::new(),
            foreign_key_relations: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Bare and schema-qualified names of every table and view.
    pub fn table_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for table in &self.tables {
            names.insert(table.name.clone());
            names.insert(table.full_name());
        }
        for view in &self.views {
            names.insert(view.name.clone());
            names.insert(view.full_name());
        }
        names
    }

    /// Column names of a table or view, looked up by bare or qualified name.
    ///
    /// Returns an empty set when nothing matches.
    pub fn column_names(&self, table: &str) -> BTreeSet<String> {
        let is_match = |name: &str, full: String| name == table || full == table;

        self.tables
            .iter()
            .find(|t| is_match(&t.name, t.full_name()))
            .map(|t| &t.columns)
            .or_else(|| {
                self.views
                    .iter()
                    .find(|v| is_match(&v.name, v.full_name()))
                    .map(|v| &v.columns)
            })
            .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Gets the total number of tables and views
    pub fn object_count(&self) -> usize {
        self.tables.len().saturating_add(self.views.len())
    }

    /// Renders the snapshot as Markdown for a SQL-generating model.
    ///
    /// Tables list every column with type, nullability, key markers
    /// (`PK`, `FK -> schema.table.column`), default and comment; views,
    /// enum labels and foreign-key relationships follow in their own
    /// sections. Empty sections are omitted.
    pub fn to_llm_context(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Database: {} ({})", self.database_name, self.database_type);
        out.push('\n');

        if !self.tables.is_empty() {
            out.push_str("## Tables\n\n");
            for table in &self.tables {
                let _ = writeln!(out, "### {}", table.full_name());
                if let Some(comment) = &table.comment {
                    let _ = writeln!(out, "Comment: {}", comment);
                }
                if let Some(rows) = table.estimated_row_count {
                    let _ = writeln!(out, "Estimated rows: ~{}", rows);
                }
                out.push('\n');
                out.push_str("| Column | Type | Nullable | Key | Default | Comment |\n");
                out.push_str("|--------|------|----------|-----|---------|---------|\n");
                for column in &table.columns {
                    let _ = writeln!(
                        out,
                        "| {} | {} | {} | {} | {} | {} |",
                        column.name,
                        column.data_type,
                        if column.is_nullable { "YES" } else { "NO" },
                        key_marker(column),
                        column.default_value.as_deref().unwrap_or(""),
                        column.comment.as_deref().unwrap_or(""),
                    );
                }
                out.push('\n');
            }
        }

        if !self.views.is_empty() {
            out.push_str("## Views\n\n");
            for view in &self.views {
                let _ = writeln!(out, "### {}", view.full_name());
                if let Some(comment) = &view.comment {
                    let _ = writeln!(out, "Comment: {}", comment);
                }
                let columns: Vec<String> = view
                    .columns
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.data_type))
                    .collect();
                let _ = writeln!(out, "\nColumns: {}\n", columns.join(", "));
            }
        }

        if !self.enum_types.is_empty() {
            out.push_str("## Enum Types\n\n");
            for enum_type in &self.enum_types {
                let values: Vec<String> = enum_type
                    .values
                    .iter()
                    .map(|v| format!("'{}'", v))
                    .collect();
                let _ = writeln!(
                    out,
                    "- {}.{}: [{}]",
                    enum_type.schema_name,
                    enum_type.name,
                    values.join(", ")
                );
            }
            out.push('\n');
        }

        if !self.foreign_key_relations.is_empty() {
            out.push_str("## Relationships\n\n");
            for fk in &self.foreign_key_relations {
                let _ = writeln!(
                    out,
                    "- {}({}) -> {}({})",
                    fk.from_table,
                    fk.from_columns.join(", "),
                    fk.to_table,
                    fk.to_columns.join(", ")
                );
            }
            out.push('\n');
        }

        out
    }
}

fn key_marker(column: &ColumnInfo) -> String {
    if column.is_primary_key {
        "PK".to_string()
    } else if column.is_foreign_key {
        format!(
            "FK -> {}.{}",
            column.foreign_table.as_deref().unwrap_or("?"),
            column.foreign_column.as_deref().unwrap_or("?")
        )
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> SchemaSnapshot {
        let mut id = ColumnInfo::new("id", "integer");
        id.is_nullable = false;
        id.is_primary_key = true;

        let mut user_id = ColumnInfo::new("user_id", "integer");
        user_id.is_foreign_key = true;
        user_id.foreign_table = Some("public.users".to_string());
        user_id.foreign_column = Some("id".to_string());

        let mut email = ColumnInfo::new("email", "character varying");
        email.comment = Some("login address".to_string());

        let mut snapshot = SchemaSnapshot::new("shop", DatabaseType::PostgreSQL);
        snapshot.tables = vec![
            TableInfo {
                schema_name: "public".to_string(),
                name: "users".to_string(),
                columns: vec![id.clone(), email],
                indexes: Vec::new(),
                comment: Some("registered users".to_string()),
                estimated_row_count: Some(1200),
            },
            TableInfo {
                schema_name: "public".to_string(),
                name: "orders".to_string(),
                columns: vec![id, user_id],
                indexes: Vec::new(),
                comment: None,
                estimated_row_count: None,
            },
        ];
        snapshot.views = vec![ViewInfo {
            schema_name: "reporting".to_string(),
            name: "daily_sales".to_string(),
            columns: vec![ColumnInfo::new("day", "date")],
            definition: Some("SELECT ...".to_string()),
            comment: None,
        }];
        snapshot.enum_types = vec![EnumTypeInfo {
            schema_name: "public".to_string(),
            name: "order_status".to_string(),
            values: vec!["pending".to_string(), "shipped".to_string()],
        }];
        snapshot.foreign_key_relations = vec![ForeignKeyRelation {
            from_table: "public.orders".to_string(),
            from_columns: vec!["user_id".to_string()],
            to_table: "public.users".to_string(),
            to_columns: vec!["id".to_string()],
            constraint_name: "orders_user_id_fkey".to_string(),
        }];
        snapshot
    }

    #[test]
    fn test_table_names_include_bare_and_qualified() {
        let names = sample_snapshot().table_names();
        for expected in [
            "users",
            "public.users",
            "orders",
            "public.orders",
            "daily_sales",
            "reporting.daily_sales",
        ] {
            assert!(names.contains(expected), "missing {}", expected);
        }
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_column_names_lookup() {
        let snapshot = sample_snapshot();
        let columns = snapshot.column_names("public.users");
        assert!(columns.contains("email"));
        assert_eq!(snapshot.column_names("users"), columns);
        assert!(snapshot.column_names("daily_sales").contains("day"));
        assert!(snapshot.column_names("missing").is_empty());
    }

    #[test]
    fn test_llm_context_rendering() {
        let context = sample_snapshot().to_llm_context();

        assert!(context.starts_with("Database: shop (PostgreSQL)"));
        assert!(context.contains("## Tables"));
        assert!(context.contains("### public.users"));
        assert!(context.contains("Comment: registered users"));
        assert!(context.contains("Estimated rows: ~1200"));
        assert!(context.contains("| id | integer | NO | PK |  |  |"));
        assert!(context.contains("| user_id | integer | YES | FK -> public.users.id |  |  |"));
        assert!(context.contains("| email | character varying | YES |  |  | login address |"));
        assert!(context.contains("## Views"));
        assert!(context.contains("Columns: day (date)"));
        assert!(context.contains("- public.order_status: ['pending', 'shipped']"));
        assert!(context.contains("- public.orders(user_id) -> public.users(id)"));
    }

    #[test]
    fn test_llm_context_omits_empty_sections() {
        let snapshot = SchemaSnapshot::new("empty", DatabaseType::MySQL);
        let context = snapshot.to_llm_context();

        assert!(context.starts_with("Database: empty (MySQL)"));
        assert!(!context.contains("## Tables"));
        assert!(!context.contains("## Relationships"));
        assert_eq!(snapshot.object_count(), 0);
    }
}
