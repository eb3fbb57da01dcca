// Pooled SQLite handles, one pool per database file
use crate::domain::error::AppError;
use crate::domain::model::{PoolConfig, PoolStats};
use crate::domain::traits::Manager;
use crate::infrastructure::pool::Pool;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_rusqlite::Connection;

pub type SqlitePool = Pool<SqliteManager>;

/// Opens handles on a single database file.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl Manager for SqliteManager {
    type Resource = Connection;
    type Error = AppError;

    async fn create(&self) -> Result<Connection, AppError> {
        let db = Connection::open(self.path.clone()).await?;
        let busy_timeout = self.busy_timeout;

        db.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            // WAL lets pooled readers proceed while one handle writes
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            Ok::<_, rusqlite::Error>(())
        })
        .await?;

        Ok(db)
    }

    async fn check(&self, db: &mut Connection) -> Result<(), AppError> {
        db.call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(())
    }
}

/// Registry of SQLite pools keyed by database path.
#[derive(Clone)]
pub struct SqlitePools {
    pools: Arc<DashMap<PathBuf, SqlitePool>>,
    config: PoolConfig,
}

impl SqlitePools {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
            config,
        }
    }

    /// The pool for `path`, created on first use.
    pub fn pool_for(&self, path: &Path) -> SqlitePool {
        self.pools
            .entry(path.to_path_buf())
            .or_insert_with(|| Pool::new(SqliteManager::new(path), self.config.clone()))
            .clone()
    }

    pub fn stats(&self) -> Vec<(PathBuf, PoolStats)> {
        let mut stats: Vec<_> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Close every pool and forget them. Returns the number of idle handles destroyed.
    pub fn close_all(&self) -> usize {
        let destroyed = self.pools.iter().map(|entry| entry.value().close()).sum();
        self.pools.clear();
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("rbc-sqlite-{}.db", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn same_path_shares_a_pool() {
        let pools = SqlitePools::new(PoolConfig::default());
        let path = temp_db();

        let first = pools.pool_for(&path);
        let conn = first.get().await.unwrap();
        drop(conn);

        let second = pools.pool_for(&path);
        assert_eq!(second.stats().created, 1);
        assert_eq!(pools.stats().len(), 1);

        pools.close_all();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn handles_pass_health_check() {
        let path = temp_db();
        let manager = SqliteManager::new(&path);
        let mut db = manager.create().await.unwrap();
        assert!(manager.check(&mut db).await.is_ok());
        drop(db);
        let _ = std::fs::remove_file(&path);
    }
}
