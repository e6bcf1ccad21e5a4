//! Read-only SQL gateway core.
//!
//! This crate turns a connection URL and a SQL statement, or a
//! natural-language request, into a JSON-ready [`QueryResult`] while
//! guaranteeing that nothing but a single read-only statement ever reaches
//! the database.
//!
//! # Security Guarantees
//! - Statements are parsed into an AST and rejected unless they are a single
//!   `SELECT` (or `WITH ... SELECT`) free of denylisted functions
//! - Sessions are opened read-only with a server-side statement timeout
//! - Row counts are capped by injecting a `LIMIT` when none is present
//! - Credentials never appear in logs, errors or `Debug` output
//!
//! # Architecture
//! - [`registry::AdapterRegistry`] maps a URL scheme to a per-dialect
//!   [`adapters::DialectAdapter`], created lazily
//! - each adapter owns one connection pool per normalized URL and a schema
//!   snapshot cache
//! - [`validator::SqlValidator`] is the safety gate in front of execution
//! - [`orchestrator::QueryOrchestrator`] sequences schema lookup, SQL
//!   generation by a host-provided [`orchestrator::LlmClient`], validation,
//!   execution and result review
//! - every failure is a [`GatewayError`] carrying one [`ErrorCode`]

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod security;
pub mod validator;

// Re-export commonly used types
pub use adapters::{DialectAdapter, NativeValue, PoolStats};
pub use config::{GatewaySettings, PoolSettings, QuerySettings, ValidatorSettings};
pub use error::{ErrorCode, GatewayError, Result, redact_database_url};
pub use logging::{init_json_logging, init_logging};
pub use models::{DatabaseType, QueryResult, SchemaSnapshot};
pub use orchestrator::{LlmClient, QueryOrchestrator, QueryResponse};
pub use registry::AdapterRegistry;
pub use validator::{KnownTables, SqlValidator, ValidationVerdict};
