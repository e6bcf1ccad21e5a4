//! Unit tests for adapter composition, using in-memory capability fakes.

use super::*;
use crate::error::ErrorCode;
use crate::models::TableInfo;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct FakeConnections {
    reachable: bool,
    closed_urls: Mutex<Vec<String>>,
    close_all_calls: AtomicUsize,
}

#[async_trait]
impl ConnectionProvider for FakeConnections {
    async fn test_connection(&self, _url: &str) -> bool {
        self.reachable
    }

    async fn close_pool(&self, url: &str) {
        self.closed_urls.lock().unwrap().push(url.to_string());
    }

    async fn close_all(&self) {
        self.close_all_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn pool_stats(&self, _url: &str) -> Option<PoolStats> {
        Some(PoolStats::from_counts(3, 1, 5))
    }
}

#[derive(Default)]
struct FakeMetadata {
    calls: AtomicUsize,
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn fetch_metadata(&self, database_name: &str, _url: &str) -> Result<SchemaSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut snapshot = SchemaSnapshot::new(database_name, DatabaseType::PostgreSQL);
        snapshot.tables.push(TableInfo {
            schema_name: "public".to_string(),
            name: "users".to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
            comment: None,
            estimated_row_count: None,
        });
        Ok(snapshot)
    }
}

enum Reply {
    Rows(RawRowSet),
    Fail,
    Hang,
}

struct FakeExecutor {
    reply: Reply,
    seen: Mutex<Vec<String>>,
}

impl FakeExecutor {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn run(&self, _url: &str, sql: &str) -> Result<RawRowSet> {
        self.seen.lock().unwrap().push(sql.to_string());
        match &self.reply {
            Reply::Rows(rows) => Ok(rows.clone()),
            Reply::Fail => Err(GatewayError::query_failed(
                "relation \"nope\" does not exist",
                Some(sql),
                std::io::Error::other("backend"),
            )),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(RawRowSet::default())
            }
        }
    }
}

struct UpperTypes;

impl TypeMapper for UpperTypes {
    fn column_type(&self, backend_type: &str) -> String {
        backend_type.to_uppercase()
    }
}

fn int_rows(count: usize) -> RawRowSet {
    RawRowSet {
        columns: vec![RawColumn {
            name: "?column?".to_string(),
            type_name: "int4".to_string(),
        }],
        rows: (0..count)
            .map(|i| vec![NativeValue::Int(i64::try_from(i).unwrap_or_default())])
            .collect(),
    }
}

struct Harness {
    adapter: DialectAdapter,
    connections: Arc<FakeConnections>,
    metadata: Arc<FakeMetadata>,
    executor: Arc<FakeExecutor>,
}

fn harness(reply: Reply, max_rows: u64) -> Harness {
    let connections = Arc::new(FakeConnections {
        reachable: true,
        ..Default::default()
    });
    let metadata = Arc::new(FakeMetadata::default());
    let executor = Arc::new(FakeExecutor::new(reply));
    let parts = AdapterParts {
        connections: connections.clone(),
        metadata: metadata.clone(),
        executor: executor.clone(),
        types: Arc::new(UpperTypes),
    };
    let mut settings = GatewaySettings::default();
    settings.query.max_rows = max_rows;
    settings.query.statement_timeout_ms = 1_000;

    Harness {
        adapter: DialectAdapter::new(DatabaseType::PostgreSQL, parts, &settings),
        connections,
        metadata,
        executor,
    }
}

const URL: &str = "postgres://u:p@h:5432/db";

#[tokio::test]
async fn test_select_one_scenario() {
    let h = harness(Reply::Rows(int_rows(1)), 1000);
    let result = h.adapter.execute(URL, "SELECT 1").await.unwrap();

    assert_eq!(result.columns(), ["?column?".to_string()]);
    assert_eq!(result.column_types(), ["INT4".to_string()]);
    assert_eq!(result.rows(), [vec![json!(0)]]);
    assert_eq!(result.row_count(), 1);
    assert!(!result.is_truncated());
    assert_eq!(
        h.executor.seen.lock().unwrap().as_slice(),
        ["SELECT 1 LIMIT 1000".to_string()]
    );
}

#[tokio::test]
async fn test_unsafe_sql_never_reaches_executor() {
    let h = harness(Reply::Rows(int_rows(1)), 1000);
    let error = h
        .adapter
        .execute(URL, "SELECT 1; DROP TABLE users")
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::SqlUnsafe);
    assert!(error.to_string().contains("Multiple statements"));
    assert!(h.executor.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_truncated_only_when_injected_cap_is_reached() {
    let h = harness(Reply::Rows(int_rows(2)), 2);
    let result = h.adapter.execute(URL, "SELECT id FROM users").await.unwrap();
    assert!(result.is_truncated());

    let h = harness(Reply::Rows(int_rows(2)), 2);
    let result = h
        .adapter
        .execute(URL, "SELECT id FROM users LIMIT 2")
        .await
        .unwrap();
    assert!(!result.is_truncated());
    assert_eq!(
        h.executor.seen.lock().unwrap().as_slice(),
        ["SELECT id FROM users LIMIT 2".to_string()]
    );
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let h = harness(Reply::Rows(int_rows(0)), 10);
    let result = h.adapter.execute(URL, "SELECT id FROM users").await.unwrap();

    assert_eq!(result.row_count(), 0);
    assert_eq!(result.columns().len(), 1);
    assert!(!result.is_truncated());
}

#[tokio::test]
async fn test_executor_errors_pass_through() {
    let h = harness(Reply::Fail, 10);
    let error = h.adapter.execute(URL, "SELECT * FROM nope").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::QueryExecutionFailed);
}

#[tokio::test(start_paused = true)]
async fn test_client_side_timeout_reports_query_timeout() {
    let h = harness(Reply::Hang, 10);
    let error = h.adapter.execute(URL, "SELECT 1").await.unwrap_err();

    assert_eq!(error.code(), ErrorCode::QueryTimeout);
    assert_eq!(
        error.details().unwrap()["timeout_ms"],
        json!(1_000)
    );
}

#[tokio::test]
async fn test_metadata_is_cached_per_url() {
    let h = harness(Reply::Rows(int_rows(0)), 10);

    let first = h.adapter.metadata("shop", URL).await.unwrap();
    let again = h.adapter.metadata("shop", URL).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 1);

    // The alias scheme shares the cache entry
    let alias = h
        .adapter
        .cached_metadata("postgresql://u:p@h:5432/db")
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &alias));

    let refreshed = h.adapter.fetch_metadata("shop", URL).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &refreshed));
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_known_tables_come_from_cached_snapshot() {
    let h = harness(Reply::Rows(int_rows(0)), 10);
    assert!(h.adapter.known_tables(URL).await.is_none());

    h.adapter.fetch_metadata("shop", URL).await.unwrap();
    let known = h.adapter.known_tables(URL).await.unwrap();

    assert!(h.adapter.validate("SELECT * FROM users", Some(&known)).is_safe());
    assert!(!h.adapter.validate("SELECT * FROM secrets", Some(&known)).is_safe());
}

#[tokio::test]
async fn test_close_pool_and_close() {
    let h = harness(Reply::Rows(int_rows(0)), 10);
    h.adapter.fetch_metadata("shop", URL).await.unwrap();

    h.adapter.close_pool(URL).await;
    assert!(h.adapter.cached_metadata(URL).await.is_none());
    assert_eq!(
        h.connections.closed_urls.lock().unwrap().as_slice(),
        [URL.to_string()]
    );

    h.adapter.close().await;
    h.adapter.close().await;
    assert_eq!(h.connections.close_all_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_passthrough_operations() {
    let h = harness(Reply::Rows(int_rows(0)), 10);

    assert!(h.adapter.test_connection(URL).await);
    assert_eq!(h.adapter.validate_sql("SELECT 1"), (true, None));
    assert_eq!(h.adapter.inject_limit("SELECT 1"), "SELECT 1 LIMIT 10");

    let stats = h.adapter.pool_stats(URL).await.unwrap();
    assert_eq!(stats.total_connections, 3);
    assert_eq!(stats.idle_connections, 1);
    assert_eq!(stats.active_connections, 2);
}

#[test]
fn test_pool_stats_clamp_idle() {
    let stats = PoolStats::from_counts(2, 9, 5);
    assert_eq!(stats.idle_connections, 2);
    assert_eq!(stats.active_connections, 0);
}
