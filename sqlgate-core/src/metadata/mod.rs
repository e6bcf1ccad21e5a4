//! Schema metadata cache.
//!
//! Snapshots are built in full by a dialect's metadata provider and then
//! installed here with a single `Arc` swap. Readers clone the `Arc` and keep
//! a consistent snapshot for as long as they hold it, no matter how many
//! refreshes land in the meantime.
//!
//! Concurrent refreshes of the same URL are not coalesced: each builds its
//! own snapshot and the last one installed wins. Both are complete, so a
//! reader can observe either but never a mix.

mod catalog;

pub use catalog::{
    CatalogRows, ColumnRow, EnumRow, ForeignKeyRow, IndexRow, PrimaryKeyRow, TableRow, ViewRow,
    assemble_snapshot,
};

use crate::models::SchemaSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest snapshot per connection URL.
#[derive(Debug, Default)]
pub struct SchemaCache {
    snapshots: RwLock<HashMap<String, Arc<SchemaSnapshot>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for `key`, if one was ever installed
    pub async fn get(&self, key: &str) -> Option<Arc<SchemaSnapshot>> {
        self.snapshots.read().await.get(key).cloned()
    }

    /// Replaces the snapshot for `key` and returns the shared handle.
    pub async fn install(&self, key: &str, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .await
            .insert(key.to_string(), Arc::clone(&snapshot));
        snapshot
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        self.snapshots.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.snapshots.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatabaseType, TableInfo};

    fn snapshot(table: &str) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new("shop", DatabaseType::PostgreSQL);
        snapshot.tables.push(TableInfo {
            schema_name: "public".to_string(),
            name: table.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
            comment: None,
            estimated_row_count: None,
        });
        snapshot
    }

    #[tokio::test]
    async fn test_install_and_get() {
        let cache = SchemaCache::new();
        assert!(cache.get("postgresql://h/shop").await.is_none());

        let installed = cache.install("postgresql://h/shop", snapshot("users")).await;
        let fetched = cache.get("postgresql://h/shop").await.unwrap();

        assert!(Arc::ptr_eq(&installed, &fetched));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_swaps_whole_snapshot() {
        let cache = SchemaCache::new();
        let old = cache.install("k", snapshot("users")).await;
        let held = cache.get("k").await.unwrap();

        cache.install("k", snapshot("accounts")).await;
        let current = cache.get("k").await.unwrap();

        // A reader holding the old snapshot keeps seeing it in full
        assert!(Arc::ptr_eq(&old, &held));
        assert!(held.table_names().contains("users"));
        assert!(current.table_names().contains("accounts"));
        assert!(!current.table_names().contains("users"));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_leave_one_complete_snapshot() {
        let cache = Arc::new(SchemaCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache.install("k", snapshot(&format!("t{}", i))).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let current = cache.get("k").await.unwrap();
        assert_eq!(current.tables.len(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = SchemaCache::new();
        cache.install("a", snapshot("x")).await;
        cache.install("b", snapshot("y")).await;

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}
