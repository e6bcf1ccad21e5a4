//! MySQL gateway integration tests with testcontainers.
//!
//! This test suite covers:
//! - Dispatch of the `mysql` scheme and its driver-suffixed aliases
//! - Catalog collection from INFORMATION_SCHEMA
//! - Read-only execution, limit injection and empty results
//! - Validator rejections specific to MySQL

#![cfg(feature = "mysql")]

use sqlgate_core::{
    AdapterRegistry, ErrorCode, GatewayError, GatewaySettings, Result, models::DatabaseType,
};
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Helper function to wait for MySQL to be ready
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) -> Result<()> {
    let mut attempts = 0;
    while attempts < max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                pool.close().await;
                return Ok(());
            }
            pool.close().await;
        }
        attempts += 1;
        if attempts < max_attempts {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
    Err(GatewayError::internal(format!(
        "MySQL failed to become ready after {} attempts",
        max_attempts
    )))
}

async fn seed(database_url: &str) {
    let pool = MySqlPool::connect(database_url).await.unwrap();
    for statement in [
        "CREATE TABLE users (
            id INT AUTO_INCREMENT PRIMARY KEY,
            email VARCHAR(255) NOT NULL UNIQUE,
            is_admin BOOLEAN NOT NULL DEFAULT FALSE
        ) COMMENT = 'Registered customers'",
        "CREATE TABLE orders (
            id INT AUTO_INCREMENT PRIMARY KEY,
            user_id INT NOT NULL,
            total DECIMAL(10, 2),
            placed_at DATETIME NOT NULL DEFAULT '2024-01-02 03:04:05',
            CONSTRAINT fk_orders_user FOREIGN KEY (user_id) REFERENCES users(id),
            INDEX orders_user_idx (user_id, placed_at)
        )",
        "CREATE VIEW big_orders AS SELECT id, total FROM orders WHERE total > 10",
        "INSERT INTO users (email, is_admin) VALUES ('a@example.com', TRUE), ('b@example.com', FALSE)",
        "INSERT INTO orders (user_id, total) VALUES (1, 19.99), (2, 5.00)",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

#[tokio::test]
async fn test_integration_mysql_gateway_end_to_end() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);

    wait_for_mysql_ready(&database_url, 60).await?;
    seed(&database_url).await;

    let registry = AdapterRegistry::new(GatewaySettings::default())?;
    let adapter = registry.dispatch(&database_url).await?;
    assert_eq!(adapter.dialect(), DatabaseType::MySQL);
    let alias = database_url.replacen("mysql://", "mysql+aiomysql://", 1);
    assert!(std::sync::Arc::ptr_eq(
        &adapter,
        &registry.dispatch(&alias).await?
    ));
    assert!(adapter.test_connection(&database_url).await);

    // Catalog collection
    let snapshot = adapter.fetch_metadata("test", &database_url).await?;
    let users = snapshot.tables.iter().find(|t| t.name == "users").unwrap();
    assert_eq!(users.schema_name, "test");
    assert_eq!(users.comment.as_deref(), Some("Registered customers"));
    assert!(users.columns.iter().any(|c| c.name == "id" && c.is_primary_key));
    assert!(users.indexes.iter().any(|i| i.is_primary));
    assert!(users.indexes.iter().any(|i| i.name == "email" && i.is_unique));

    let orders = snapshot.tables.iter().find(|t| t.name == "orders").unwrap();
    let user_id = orders.columns.iter().find(|c| c.name == "user_id").unwrap();
    assert!(user_id.is_foreign_key);
    assert_eq!(user_id.foreign_table.as_deref(), Some("test.users"));
    let index = orders
        .indexes
        .iter()
        .find(|i| i.name == "orders_user_idx")
        .unwrap();
    assert_eq!(index.columns, ["user_id", "placed_at"]);

    assert!(snapshot.views.iter().any(|v| v.name == "big_orders"));
    assert!(snapshot.enum_types.is_empty());
    assert_eq!(snapshot.foreign_key_relations.len(), 1);
    assert_eq!(snapshot.foreign_key_relations[0].constraint_name, "fk_orders_user");

    // Execution and type serialization
    let result = adapter
        .execute(
            &database_url,
            "SELECT o.id, u.email, u.is_admin, o.total, o.placed_at
             FROM orders o JOIN users u ON u.id = o.user_id ORDER BY o.id",
        )
        .await?;
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.column_types()[2], "tinyint(1)");
    assert_eq!(result.rows()[0][1], serde_json::json!("a@example.com"));
    assert_eq!(result.rows()[0][2], serde_json::json!(true));
    assert_eq!(result.rows()[0][3], serde_json::json!(19.99));
    assert_eq!(result.rows()[0][4], serde_json::json!("2024-01-02T03:04:05"));

    let empty = adapter
        .execute(&database_url, "SELECT id, email FROM users WHERE 1 = 0")
        .await?;
    assert_eq!(empty.row_count(), 0);
    assert_eq!(empty.columns(), ["id", "email"]);

    registry.close_all().await;
    Ok(())
}

#[tokio::test]
async fn test_integration_mysql_truncation_and_safety() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);

    wait_for_mysql_ready(&database_url, 60).await?;

    let mut settings = GatewaySettings::default();
    settings.query.max_rows = 3;
    let registry = AdapterRegistry::new(settings)?;
    let adapter = registry.dispatch(&database_url).await?;

    let capped = adapter
        .execute(
            &database_url,
            "SELECT table_name FROM information_schema.columns",
        )
        .await?;
    assert_eq!(capped.row_count(), 3);
    assert!(capped.is_truncated());

    for sql in [
        "SELECT SLEEP(10)",
        "SELECT BENCHMARK(1000000, MD5('x'))",
        "SELECT LOAD_FILE('/etc/passwd')",
        "SELECT * FROM information_schema.tables INTO OUTFILE '/tmp/x'",
        "UPDATE users SET email = 'x'",
    ] {
        let error = adapter.execute(&database_url, sql).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::SqlUnsafe, "{}", sql);
    }

    let missing = adapter
        .execute(&database_url, "SELECT * FROM no_such_table")
        .await
        .unwrap_err();
    assert_eq!(missing.code(), ErrorCode::QueryExecutionFailed);

    registry.close_all().await;
    Ok(())
}
