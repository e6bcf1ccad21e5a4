//! AST-based SQL safety validation.
//!
//! Every statement the gateway runs passes through [`SqlValidator`] first.
//! The validator parses the SQL for the target dialect and accepts it only
//! when all of the following hold:
//!
//! 1. the input is not empty and parses as exactly one statement
//! 2. that statement is a plain `SELECT` (CTEs, subqueries, joins, ORDER BY
//!    and LIMIT are fine; set operations and everything else are not)
//! 3. no data-modifying statement, `SELECT INTO` or row-locking clause is
//!    nested anywhere inside it
//! 4. no function on the configured denylist is called anywhere in it
//! 5. when a set of known tables is supplied, every table read is in it
//!
//! Checks run in that order and the first failure decides the reason.
//!
//! # Security
//! The denylist is best-effort and names only well-known dangerous
//! functions. The pool's read-only session remains the authoritative guard
//! against writes.

mod parser;


pub use parser::{AstSqlParser, ParseFailure, SqlParser, StatementKind, StatementOutline, TableRef};

use crate::config::ValidatorSettings;
use crate::error::GatewayError;
use crate::models::DatabaseType;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};

/// Functions rejected by default: server file access, large objects,
/// cross-database links, server-side programs, session setting changes
/// and deliberate stalls.
pub const DEFAULT_DENIED_FUNCTIONS: &[&str] = &[
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "lo_import",
    "lo_export",
    "lo_create",
    "lo_open",
    "lo_write",
    "lo_put",
    "lo_get",
    "dblink",
    "dblink_exec",
    "dblink_connect",
    "dblink_send_query",
    "copy",
    "pg_execute_server_program",
    "set_config",
    "load_file",
    "sleep",
    "benchmark",
];

const EMPTY_STATEMENT: &str = "SQL statement is empty";
const MULTIPLE_STATEMENTS: &str =
    "Multiple statements are not allowed. Please execute one SELECT query at a time.";

/// Outcome of validating one SQL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Safe { sql: String },
    Rejected { reason: String, sql: String },
}

impl ValidationVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe { .. })
    }

    /// Rejection reason, `None` when safe
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Safe { .. } => None,
            Self::Rejected { reason, .. } => Some(reason),
        }
    }

    /// The validated SQL, or `SqlUnsafe` carrying the rejection reason.
    pub fn into_result(self) -> crate::Result<String> {
        match self {
            Self::Safe { sql } => Ok(sql),
            Self::Rejected { reason, sql } => Err(GatewayError::sql_unsafe(reason, sql)),
        }
    }
}

/// Lowercased table names a statement may read.
///
/// Holds bare (`orders`) and schema-qualified (`sales.orders`) names. A
/// bare reference must match a bare name and a qualified reference must
/// match a qualified name, so `pg_catalog.orders` never passes on the
/// strength of `orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownTables(HashSet<String>);

impl KnownTables {
    pub fn contains(&self, table: &TableRef) -> bool {
        self.0.contains(&table.qualified().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for KnownTables {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| s.as_ref().to_lowercase()).collect())
    }
}

impl From<&BTreeSet<String>> for KnownTables {
    fn from(names: &BTreeSet<String>) -> Self {
        names.iter().collect()
    }
}

/// Dialect-bound SQL safety validator.
///
/// # Example
/// ```rust
/// use sqlgate_core::config::ValidatorSettings;
/// use sqlgate_core::models::DatabaseType;
/// use sqlgate_core::validator::SqlValidator;
///
/// let validator = SqlValidator::new(DatabaseType::PostgreSQL, &ValidatorSettings::default(), 1000);
///
/// assert!(validator.validate("SELECT id FROM users", None).is_safe());
/// assert_eq!(
///     validator.validate("DELETE FROM users", None).reason(),
///     Some("Only SELECT queries are allowed, got: DELETE")
/// );
/// ```
pub struct SqlValidator {
    dialect: DatabaseType,
    parser: Arc<dyn SqlParser>,
    denylist: BTreeSet<String>,
    max_rows: u64,
}

impl std::fmt::Debug for SqlValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlValidator")
            .field("dialect", &self.dialect)
            .field("denylist_len", &self.denylist.len())
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

impl SqlValidator {
    /// Creates a validator using the built-in `sqlparser` backend.
    pub fn new(dialect: DatabaseType, settings: &ValidatorSettings, max_rows: u64) -> Self {
        Self::with_parser(dialect, Arc::new(AstSqlParser), settings, max_rows)
    }

    /// Creates a validator over any [`SqlParser`].
    pub fn with_parser(
        dialect: DatabaseType,
        parser: Arc<dyn SqlParser>,
        settings: &ValidatorSettings,
        max_rows: u64,
    ) -> Self {
        Self {
            dialect,
            parser,
            denylist: settings.denylist(),
            max_rows,
        }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    /// Validates `sql`, restricting table references to `known_tables` when
    /// it is supplied.
    pub fn validate(&self, sql: &str, known_tables: Option<&KnownTables>) -> ValidationVerdict {
        match self.rejection(sql, known_tables) {
            None => ValidationVerdict::Safe {
                sql: sql.to_string(),
            },
            Some(reason) => {
                tracing::warn!(
                    dialect = %self.dialect,
                    reason = %reason,
                    sql_len = sql.len(),
                    "SQL rejected by safety validator"
                );
                ValidationVerdict::Rejected {
                    reason,
                    sql: sql.to_string(),
                }
            }
        }
    }

    /// Pair form of [`Self::validate`] without a table restriction.
    pub fn validate_sql(&self, sql: &str) -> (bool, Option<String>) {
        match self.validate(sql, None) {
            ValidationVerdict::Safe { .. } => (true, None),
            ValidationVerdict::Rejected { reason, .. } => (false, Some(reason)),
        }
    }

    /// Whether `sql` passes validation without a table restriction.
    pub fn is_select_only(&self, sql: &str) -> bool {
        self.validate(sql, None).is_safe()
    }

    /// Attaches `LIMIT max_rows` to an unbounded SELECT.
    ///
    /// Statements that are not a single SELECT, or that already carry a
    /// row cap, come back unchanged. The limit is attached through the AST;
    /// plain text is appended only when parsing or rendering fails and the
    /// text has no `LIMIT <n>` clause.
    pub fn inject_limit(&self, sql: &str) -> String {
        let outlines = match self.parser.parse(sql, self.dialect) {
            Ok(outlines) => outlines,
            Err(e) => {
                tracing::debug!(error = %e, "Falling back to textual LIMIT injection");
                return self.append_limit(sql);
            }
        };

        match outlines.as_slice() {
            [outline] if outline.is_select() && !outline.has_limit => {
                match self.parser.render_with_limit(sql, self.dialect, self.max_rows) {
                    Ok(rendered) => rendered,
                    Err(e) => {
                        tracing::debug!(error = %e, "Falling back to textual LIMIT injection");
                        self.append_limit(sql)
                    }
                }
            }
            _ => sql.to_string(),
        }
    }

    fn append_limit(&self, sql: &str) -> String {
        let capped = match existing_limit() {
            Some(re) => re.is_match(sql),
            None => sql.to_uppercase().contains("LIMIT"),
        };
        if capped {
            return sql.to_string();
        }
        format!(
            "{} LIMIT {}",
            sql.trim_end().trim_end_matches(';').trim_end(),
            self.max_rows
        )
    }

    fn rejection(&self, sql: &str, known_tables: Option<&KnownTables>) -> Option<String> {
        if sql.trim().is_empty() {
            return Some(EMPTY_STATEMENT.to_string());
        }

        let outlines = match self.parser.parse(sql, self.dialect) {
            Ok(outlines) => outlines,
            Err(e) => {
                return Some(format!("SQL syntax error: {}", clean_message(&e.message)));
            }
        };

        let outline = match outlines.as_slice() {
            [] => return Some(EMPTY_STATEMENT.to_string()),
            [single] => single,
            _ => return Some(MULTIPLE_STATEMENTS.to_string()),
        };

        match &outline.kind {
            StatementKind::Select => {}
            StatementKind::Other(label) => {
                return Some(format!("Only SELECT queries are allowed, got: {}", label));
            }
            StatementKind::Unparsed => return Some(MULTIPLE_STATEMENTS.to_string()),
        }

        if let Some(operation) = outline.disallowed.first() {
            return Some(format!("Disallowed operation: {}", operation));
        }

        if let Some(function) = outline
            .functions
            .iter()
            .find(|name| self.denylist.contains(&name.to_lowercase()))
        {
            return Some(format!("Disallowed function: {}", function.to_lowercase()));
        }

        if let Some(known) = known_tables
            && let Some(unknown) = outline.tables.iter().find(|t| !known.contains(t))
        {
            return Some(format!("Unknown table: {}", unknown.qualified()));
        }

        None
    }
}

fn existing_limit() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\blimit\s+\d").ok())
        .as_ref()
}

fn ansi_escape() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").ok())
        .as_ref()
}

/// Strips terminal escapes and control characters from parser messages.
pub(crate) fn clean_message(message: &str) -> String {
    let stripped = match ansi_escape() {
        Some(pattern) => pattern.replace_all(message, ""),
        None => message.into(),
    };
    stripped
        .chars()
        .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
