//! Query history boundary.
//!
//! Every execution attempt produces one [`HistoryEntry`]. Storage belongs
//! to the host; [`TracingHistorySink`] simply logs the entries.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    /// Stopped by the safety validator before reaching the database
    Rejected,
    Failed,
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStatus::Success => write!(f, "success"),
            QueryStatus::Rejected => write!(f, "rejected"),
            QueryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub database_name: String,
    /// Statement that was validated or run, when one was produced
    pub sql: Option<String>,
    /// Natural-language request, for LLM-generated statements
    pub natural_prompt: Option<String>,
    pub status: QueryStatus,
    pub row_count: Option<usize>,
    pub execution_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Receives history entries.
///
/// Failures are logged by the caller and never fail the query they
/// describe.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> Result<()>;
}

/// Writes history entries to the `sqlgate::history` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHistorySink;

#[async_trait]
impl HistorySink for TracingHistorySink {
    async fn record(&self, entry: HistoryEntry) -> Result<()> {
        tracing::info!(
            target: "sqlgate::history",
            database = %entry.database_name,
            status = %entry.status,
            sql = entry.sql.as_deref().unwrap_or(""),
            row_count = entry.row_count,
            execution_time_ms = entry.execution_time_ms,
            error = entry.error_message.as_deref(),
            "Query recorded"
        );
        Ok(())
    }
}
