//! Natural-language query orchestration.
//!
//! [`QueryOrchestrator::ask`] runs one request end to end:
//! 1. dispatch the URL and load the cached schema snapshot (fetching it
//!    on first use)
//! 2. ask the [`LlmClient`] for SQL, passing the rendered snapshot
//! 3. validate the SQL against the snapshot's known tables
//! 4. execute it through the dialect adapter
//! 5. optionally have the model review the result; a failed review call
//!    counts as a pass
//!
//! Every attempt is reported to the [`HistorySink`] and ends in a single
//! [`QueryResponse`], successful or not.

mod history;
mod llm;


pub use history::{HistoryEntry, HistorySink, QueryStatus, TracingHistorySink};
pub use llm::{LlmClient, ResultJudgement, ResultReview, strip_code_fences};

use crate::adapters::{DialectAdapter, elapsed_ms};
use crate::error::{ErrorCode, GatewayError};
use crate::models::QueryResult;
use crate::registry::AdapterRegistry;
use crate::validator::KnownTables;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Rows and characters per cell shown to the result reviewer.
const REVIEW_SAMPLE_ROWS: usize = 5;
const REVIEW_SAMPLE_CHARS: usize = 50;

/// Outward-facing outcome of one request.
///
/// Exactly one of `result` and `error` is set, matching `success`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub sql: Option<String>,
    pub result: Option<QueryResult>,
    pub validation: Option<ResultJudgement>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub generated_at: DateTime<Utc>,
}

impl QueryResponse {
    fn succeeded(sql: String, result: QueryResult, validation: Option<ResultJudgement>) -> Self {
        Self {
            success: true,
            sql: Some(sql),
            result: Some(result),
            validation,
            error: None,
            error_code: None,
            generated_at: Utc::now(),
        }
    }

    fn failed(sql: Option<String>, error: &GatewayError) -> Self {
        Self {
            success: false,
            sql,
            result: None,
            validation: None,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            generated_at: Utc::now(),
        }
    }
}

/// State gathered while a request runs, kept for the failure path.
#[derive(Default)]
struct Attempt {
    sql: Option<String>,
}

/// Sequences schema lookup, SQL generation, validation and execution.
pub struct QueryOrchestrator {
    registry: Arc<AdapterRegistry>,
    llm: Arc<dyn LlmClient>,
    history: Arc<dyn HistorySink>,
    review_results: bool,
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("registry", &self.registry)
            .field("review_results", &self.review_results)
            .finish_non_exhaustive()
    }
}

impl QueryOrchestrator {
    /// Creates an orchestrator that logs history through tracing.
    ///
    /// Result review follows `query.enable_result_validation` in the
    /// registry's settings.
    pub fn new(registry: Arc<AdapterRegistry>, llm: Arc<dyn LlmClient>) -> Self {
        let review_results = registry.settings().query.enable_result_validation;
        Self {
            registry,
            llm,
            history: Arc::new(TracingHistorySink),
            review_results,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn with_result_review(mut self, enabled: bool) -> Self {
        self.review_results = enabled;
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Answers a natural-language request against `url`.
    pub async fn ask(&self, database_name: &str, url: &str, request: &str) -> QueryResponse {
        let span = tracing::info_span!("ask", database = database_name);
        async {
            let started = Instant::now();
            tracing::info!(request = %preview(request), "Processing natural-language query");

            let mut attempt = Attempt::default();
            let outcome =
                AssertUnwindSafe(self.generate_and_run(database_name, url, request, &mut attempt))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(panic_to_error(panic)));

            self.finish(database_name, Some(request), attempt, outcome, started)
                .await
        }
        .instrument(span)
        .await
    }

    /// Runs caller-supplied SQL through validation and execution, without
    /// the language model.
    ///
    /// Table names are checked against the cached snapshot when one exists.
    pub async fn execute_sql(&self, database_name: &str, url: &str, sql: &str) -> QueryResponse {
        let started = Instant::now();
        let attempt = Attempt {
            sql: Some(sql.to_string()),
        };

        let outcome = AssertUnwindSafe(async {
            let adapter = self.registry.dispatch(url).await?;
            let known = adapter.known_tables(url).await;
            let sql = adapter.validate(sql, known.as_ref()).into_result()?;
            let result = adapter.execute_query(database_name, url, &sql).await?;
            Ok::<_, GatewayError>((result, None::<ResultJudgement>))
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_to_error(panic)));

        self.finish(database_name, None, attempt, outcome, started).await
    }

    async fn generate_and_run(
        &self,
        database_name: &str,
        url: &str,
        request: &str,
        attempt: &mut Attempt,
    ) -> Result<(QueryResult, Option<ResultJudgement>)> {
        let adapter = self.registry.dispatch(url).await?;
        let snapshot = adapter.metadata(database_name, url).await?;

        let raw = self
            .llm
            .generate_sql(request, &snapshot.to_llm_context(), adapter.dialect())
            .await?;
        let sql = strip_code_fences(&raw);
        if sql.is_empty() {
            return Err(GatewayError::llm_service(
                "Could not extract a SQL statement from the model reply",
            ));
        }
        tracing::debug!(sql = %sql, "Model produced SQL");
        attempt.sql = Some(sql.clone());

        let known = KnownTables::from(&snapshot.table_names());
        let sql = adapter.validate(&sql, Some(&known)).into_result()?;
        let result = adapter.execute_query(database_name, url, &sql).await?;

        let validation = if self.review_results {
            Some(self.review(&adapter, request, &sql, &result).await)
        } else {
            None
        };
        Ok((result, validation))
    }

    /// Asks the model to review a result, treating a failed call as a pass.
    async fn review(
        &self,
        adapter: &DialectAdapter,
        request: &str,
        sql: &str,
        result: &QueryResult,
    ) -> ResultJudgement {
        let review = ResultReview {
            request,
            sql,
            columns: result.columns(),
            row_count: result.row_count(),
            sample: result.sample(REVIEW_SAMPLE_ROWS, REVIEW_SAMPLE_CHARS),
        };

        match self.llm.judge_result(&review).await {
            Ok(judgement) => {
                tracing::info!(
                    dialect = %adapter.dialect(),
                    passed = judgement.passed,
                    message = %judgement.message,
                    "Result review completed"
                );
                judgement
            }
            Err(e) => {
                tracing::warn!(error = %e, "Result review failed; treating as passed");
                ResultJudgement::passed(format!("Result review failed, defaulting to passed: {}", e))
            }
        }
    }

    async fn finish(
        &self,
        database_name: &str,
        natural_prompt: Option<&str>,
        attempt: Attempt,
        outcome: Result<(QueryResult, Option<ResultJudgement>)>,
        started: Instant,
    ) -> QueryResponse {
        let (response, entry) = match outcome {
            Ok((result, validation)) => {
                tracing::info!(
                    database = database_name,
                    rows = result.row_count(),
                    truncated = result.is_truncated(),
                    "Query completed successfully"
                );
                let entry = HistoryEntry {
                    database_name: database_name.to_string(),
                    sql: attempt.sql.clone(),
                    natural_prompt: natural_prompt.map(str::to_string),
                    status: QueryStatus::Success,
                    row_count: Some(result.row_count()),
                    execution_time_ms: Some(result.execution_time_ms()),
                    error_message: None,
                    recorded_at: Utc::now(),
                };
                let sql = attempt.sql.unwrap_or_default();
                (QueryResponse::succeeded(sql, result, validation), entry)
            }
            Err(error) => {
                let status = if error.code() == ErrorCode::SqlUnsafe {
                    tracing::warn!(database = database_name, error = %error, "Query rejected");
                    QueryStatus::Rejected
                } else {
                    tracing::error!(database = database_name, error = %error, "Query failed");
                    QueryStatus::Failed
                };
                let entry = HistoryEntry {
                    database_name: database_name.to_string(),
                    sql: attempt.sql.clone(),
                    natural_prompt: natural_prompt.map(str::to_string),
                    status,
                    row_count: None,
                    execution_time_ms: Some(elapsed_ms(started)),
                    error_message: Some(error.to_string()),
                    recorded_at: Utc::now(),
                };
                (QueryResponse::failed(attempt.sql, &error), entry)
            }
        };

        if let Err(e) = self.history.record(entry).await {
            tracing::warn!(error = %e, "Failed to record query history");
        }
        response
    }
}

fn preview(request: &str) -> String {
    request.chars().take(100).collect()
}

fn panic_to_error(panic: Box<dyn std::any::Any + Send>) -> GatewayError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    GatewayError::internal(format!("Unexpected failure while processing query: {}", message))
}
