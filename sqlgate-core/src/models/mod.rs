//! Core data models shared by every dialect.
//!
//! Schema snapshots and query results are plain serializable values; once
//! built they are never mutated, only replaced.

mod result;
mod schema;

pub use result::QueryResult;
pub use schema::{
    ColumnInfo, EnumTypeInfo, ForeignKeyRelation, IndexInfo, SchemaSnapshot, TableInfo, ViewInfo,
};

use crate::{Result, error::GatewayError};
use serde::{Deserialize, Serialize};

/// Supported database dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::PostgreSQL => write!(f, "PostgreSQL"),
            DatabaseType::MySQL => write!(f, "MySQL"),
        }
    }
}

impl DatabaseType {
    /// Detects the dialect from a connection URL's scheme.
    ///
    /// Recognized schemes are `postgres://`, `postgresql://`, `mysql://` and
    /// `mysql+<driver>://`. Detection never touches the network.
    ///
    /// # Example
    /// ```rust
    /// use sqlgate_core::models::DatabaseType;
    ///
    /// assert_eq!(
    ///     DatabaseType::detect("mysql+aiomysql://u:p@h/db").unwrap(),
    ///     DatabaseType::MySQL
    /// );
    /// assert!(DatabaseType::detect("oracle://h/db").is_err());
    /// ```
    pub fn detect(url: &str) -> Result<Self> {
        let Some((scheme, _)) = url.split_once("://") else {
            return Err(GatewayError::unsupported_database("<missing scheme>"));
        };
        let scheme = scheme.to_ascii_lowercase();

        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Self::PostgreSQL),
            "mysql" => Ok(Self::MySQL),
            s if s.strip_prefix("mysql+").is_some_and(|driver| !driver.is_empty()) => {
                Ok(Self::MySQL)
            }
            _ => Err(GatewayError::unsupported_database(scheme)),
        }
    }

    /// Scheme every URL of this dialect is normalized to.
    pub fn canonical_scheme(self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
        }
    }

    /// Port used when the URL does not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Self::PostgreSQL => 5432,
            Self::MySQL => 3306,
        }
    }

    /// Rewrites scheme aliases (`postgres://`, `mysql+driver://`) to the
    /// canonical scheme, leaving the rest of the URL byte-for-byte intact.
    pub fn normalize_url(self, url: &str) -> String {
        match url.split_once("://") {
            Some((_, rest)) => format!("{}://{}", self.canonical_scheme(), rest),
            None => url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_detect_postgres_schemes() {
        assert_eq!(
            DatabaseType::detect("postgres://u:p@h:5432/db").unwrap(),
            DatabaseType::PostgreSQL
        );
        assert_eq!(
            DatabaseType::detect("postgresql://h/db").unwrap(),
            DatabaseType::PostgreSQL
        );
        assert_eq!(
            DatabaseType::detect("POSTGRES://h/db").unwrap(),
            DatabaseType::PostgreSQL
        );
    }

    #[test]
    fn test_detect_mysql_schemes() {
        assert_eq!(
            DatabaseType::detect("mysql://root@localhost/app").unwrap(),
            DatabaseType::MySQL
        );
        assert_eq!(
            DatabaseType::detect("mysql+aiomysql://root@localhost/app").unwrap(),
            DatabaseType::MySQL
        );
    }

    #[test]
    fn test_detect_unknown_schemes() {
        for url in [
            "sqlite:///tmp/db",
            "mongodb://localhost",
            "mysql+://h/db",
            "postgresql+asyncpg://h/db",
        ] {
            let error = DatabaseType::detect(url).unwrap_err();
            assert_eq!(error.code(), ErrorCode::UnsupportedDatabase, "{}", url);
        }

        let error = DatabaseType::detect("localhost:5432").unwrap_err();
        assert!(error.to_string().contains("<missing scheme>"));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            DatabaseType::PostgreSQL.normalize_url("postgres://u:p@h/db?sslmode=require"),
            "postgresql://u:p@h/db?sslmode=require"
        );
        assert_eq!(
            DatabaseType::MySQL.normalize_url("mysql+aiomysql://u:p@h:3306/db"),
            "mysql://u:p@h:3306/db"
        );
        assert_eq!(
            DatabaseType::MySQL.normalize_url("mysql://u@h/db"),
            "mysql://u@h/db"
        );
    }
}
