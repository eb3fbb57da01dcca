use crate::domain::error::AppError;
use crate::domain::model::StoredRecord;
use crate::domain::traits::CacheStore;
use crate::infrastructure::storage::sqlite::SqlitePool;
use async_trait::async_trait;
use std::io::Cursor;
use tokio_rusqlite::params;
use zstd::stream::{decode_all, encode_all};

/// Persistent response tier backed by pooled SQLite handles.
///
/// Payloads are stored zstd-compressed; freshness is judged by the caller
/// from `stored_at` and `ttl_seconds`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(pool: SqlitePool) -> Result<Self, AppError> {
        let store = Self { pool };

        store
            .with_db(|conn| {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS responses (
                        key_digest TEXT PRIMARY KEY,
                        cache_key TEXT NOT NULL,
                        data BLOB NOT NULL,
                        compressed_size INTEGER NOT NULL,
                        original_size INTEGER NOT NULL,
                        stored_at INTEGER NOT NULL,
                        ttl_seconds INTEGER NOT NULL
                    )",
                    [],
                )?;

                conn.execute(
                    "CREATE INDEX IF NOT EXISTS idx_responses_stored ON responses(stored_at)",
                    [],
                )?;

                Ok(())
            })
            .await?;

        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self) -> Result<usize, AppError> {
        let count: i64 = self
            .with_db(|conn| conn.query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0)))
            .await?;
        Ok(count as usize)
    }

    // Run one closure on a pooled handle
    async fn with_db<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let result = self
            .pool
            .with_resource(|db| Box::pin(async move { db.call(f).await.map_err(AppError::from) }))
            .await?;
        Ok(result)
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn load(&self, key_digest: &str) -> Result<Option<StoredRecord>, AppError> {
        use rusqlite::OptionalExtension;

        let digest = key_digest.to_string();
        let record = self
            .with_db(move |conn| {
                conn.query_row(
                    "SELECT cache_key, data, stored_at, ttl_seconds FROM responses WHERE key_digest = ?",
                    params![digest],
                    |row| {
                        let compressed: Vec<u8> = row.get(1)?;
                        let payload = decode_all(Cursor::new(&compressed)).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                1,
                                rusqlite::types::Type::Blob,
                                Box::new(e),
                            )
                        })?;
                        let ttl_seconds: i64 = row.get(3)?;
                        Ok(StoredRecord {
                            key_digest: digest.clone(),
                            cache_key: row.get(0)?,
                            payload,
                            stored_at: row.get(2)?,
                            ttl_seconds: ttl_seconds.max(0) as u64,
                        })
                    },
                )
                .optional()
            })
            .await?;

        Ok(record)
    }

    async fn save(&self, record: StoredRecord) -> Result<(), AppError> {
        let compressed = encode_all(Cursor::new(&record.payload), 0)?;
        let compressed_len = compressed.len() as i64;
        let original_len = record.payload.len() as i64;

        self.with_db(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO responses (key_digest, cache_key, data, compressed_size, original_size, stored_at, ttl_seconds)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.key_digest,
                    record.cache_key,
                    compressed,
                    compressed_len,
                    original_len,
                    record.stored_at,
                    record.ttl_seconds as i64
                ],
            )
        })
        .await?;

        Ok(())
    }

    async fn remove(&self, key_digest: &str) -> Result<(), AppError> {
        let digest = key_digest.to_string();
        self.with_db(move |conn| {
            conn.execute("DELETE FROM responses WHERE key_digest = ?", params![digest])
        })
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<usize, AppError> {
        self.with_db(|conn| conn.execute("DELETE FROM responses", []))
            .await
    }

    async fn purge_expired(&self, now: i64) -> Result<usize, AppError> {
        self.with_db(move |conn| {
            conn.execute(
                "DELETE FROM responses WHERE stored_at + ttl_seconds <= ?",
                params![now],
            )
        })
        .await
    }
}
