//! Per-URL connection pool cache shared by the sqlx-backed dialects.

use super::PoolStats;
use crate::Result;
use sqlx::{Database, Pool};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Pools keyed by normalized connection URL.
///
/// Creation happens under the cache lock, so concurrent first callers for
/// the same URL share one pool instead of racing to build two.
pub(crate) struct PoolCache<DB: Database> {
    pools: Mutex<HashMap<String, Pool<DB>>>,
}

impl<DB: Database> Default for PoolCache<DB> {
    fn default() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }
}

impl<DB: Database> PoolCache<DB> {
    /// Returns the pool for `key`, building it with `create` on first use.
    pub(crate) async fn get_or_create<F>(&self, key: &str, create: F) -> Result<Pool<DB>>
    where
        F: FnOnce() -> Result<Pool<DB>>,
    {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(key)
            && !pool.is_closed()
        {
            return Ok(pool.clone());
        }

        let pool = create()?;
        pools.insert(key.to_string(), pool.clone());
        Ok(pool)
    }

    pub(crate) async fn get(&self, key: &str) -> Option<Pool<DB>> {
        self.pools.lock().await.get(key).cloned()
    }

    /// Removes and closes the pool for `key`, if any.
    pub(crate) async fn close(&self, key: &str) -> bool {
        let removed = self.pools.lock().await.remove(key);
        match removed {
            Some(pool) => {
                pool.close().await;
                true
            }
            None => false,
        }
    }

    /// Removes and closes every pool; returns how many were closed.
    pub(crate) async fn close_all(&self) -> usize {
        let drained: Vec<Pool<DB>> = self.pools.lock().await.drain().map(|(_, p)| p).collect();
        let count = drained.len();
        futures::future::join_all(drained.iter().map(|pool| pool.close())).await;
        count
    }

    pub(crate) async fn len(&self) -> usize {
        self.pools.lock().await.len()
    }

    pub(crate) async fn stats(&self, key: &str) -> Option<PoolStats> {
        self.get(key).await.map(|pool| {
            PoolStats::from_counts(
                pool.size(),
                pool.num_idle(),
                pool.options().get_max_connections(),
            )
        })
    }
}
