//! 响应缓存测试

use async_trait::async_trait;
use robobrain_cache::domain::model::StoredRecord;
use robobrain_cache::{AppError, CacheKey, CacheStore, TtlCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TTL: Duration = Duration::from_secs(10);

fn key(path: &str) -> CacheKey {
    CacheKey::from(format!("GET http://backend{}", path))
}

#[tokio::test(start_paused = true)]
async fn test_hit_within_ttl_skips_loader() {
    let cache: TtlCache<String> = TtlCache::new();
    let calls = AtomicUsize::new(0);
    let load = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, AppError>("graph".to_string())
    };

    let first = cache.fetch(&key("/api/visualizations/graph"), TTL, load).await.unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    let second = cache.fetch(&key("/api/visualizations/graph"), TTL, load).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_reloaded() {
    let cache: TtlCache<u32> = TtlCache::new();
    let calls = AtomicUsize::new(0);
    let load = || async { Ok::<_, AppError>(calls.fetch_add(1, Ordering::SeqCst) as u32) };

    assert_eq!(cache.fetch(&key("/api/a"), TTL, load).await.unwrap(), 0);
    tokio::time::advance(TTL).await;
    assert!(cache.get(&key("/api/a")).is_none());
    assert_eq!(cache.fetch(&key("/api/a"), TTL, load).await.unwrap(), 1);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (0, 2));
}

#[tokio::test(start_paused = true)]
async fn test_hit_does_not_extend_ttl() {
    let cache: TtlCache<u32> = TtlCache::new();
    let calls = AtomicUsize::new(0);
    let load = || async { Ok::<_, AppError>(calls.fetch_add(1, Ordering::SeqCst) as u32) };

    cache.fetch(&key("/api/a"), TTL, load).await.unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;
    cache.fetch(&key("/api/a"), TTL, load).await.unwrap();
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(cache.fetch(&key("/api/a"), TTL, load).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_is_not_cached() {
    let cache: TtlCache<String> = TtlCache::new();
    let calls = AtomicUsize::new(0);

    let err = cache
        .fetch(&key("/api/tasks"), TTL, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(AppError::Api("502 /api/tasks: Bad Gateway".to_string()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Api(ref msg) if msg.starts_with("502")));
    assert!(cache.is_empty());

    let value = cache
        .fetch(&key("/api/tasks"), TTL, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>("tasks".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, "tasks");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_load() {
    let cache: TtlCache<String> = TtlCache::new();
    let calls = AtomicUsize::new(0);
    let load = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, AppError>("kb".to_string())
    };

    let k = key("/api/knowledge");
    let (a, b, c) = tokio::join!(
        cache.fetch(&k, TTL, load),
        cache.fetch(&k, TTL, load),
        cache.fetch(&k, TTL, load)
    );
    assert_eq!(a.unwrap(), "kb");
    assert_eq!(b.unwrap(), "kb");
    assert_eq!(c.unwrap(), "kb");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (2, 1));
}

#[tokio::test(start_paused = true)]
async fn test_stats_count_every_fetch() {
    let cache: TtlCache<u32> = TtlCache::new();
    let keys = ["/a", "/b", "/a", "/c", "/a", "/b"];
    let mut total = 0;

    for (i, path) in keys.iter().enumerate() {
        let _ = cache
            .fetch(&key(path), TTL, || async move {
                if i == 3 {
                    Err(AppError::Api("boom".to_string()))
                } else {
                    Ok(i as u32)
                }
            })
            .await;
        total += 1;
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, total);
        assert!((0.0..=1.0).contains(&stats.hit_rate));
    }

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (3, 3));
    assert_eq!(stats.hit_rate, 0.5);
}

#[tokio::test]
async fn test_invalidate_and_clear() {
    let cache: TtlCache<u32> = TtlCache::new();
    for (i, path) in ["/a", "/b", "/c"].iter().enumerate() {
        cache
            .fetch(&key(path), TTL, || async move { Ok::<_, AppError>(i as u32) })
            .await
            .unwrap();
    }

    assert!(cache.invalidate(&key("/a")).await);
    assert!(!cache.invalidate(&key("/a")).await);
    assert_eq!(cache.len(), 2);

    assert_eq!(cache.clear(false).await, 2);
    assert_eq!(cache.stats().misses, 3);

    cache.clear(true).await;
    assert_eq!(cache.stats(), robobrain_cache::CacheStats::new(0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_purge_expired_sweeps_only_dead_entries() {
    let cache: TtlCache<u32> = TtlCache::new();
    cache
        .fetch(&key("/short"), Duration::from_secs(1), || async { Ok::<_, AppError>(1) })
        .await
        .unwrap();
    cache
        .fetch(&key("/long"), Duration::from_secs(60), || async { Ok::<_, AppError>(2) })
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.purge_expired().await, 1);
    assert_eq!(cache.get(&key("/long")), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_stats_size_counts_only_live_entries() {
    let cache: TtlCache<u32> = TtlCache::new();
    cache
        .fetch(&key("/x"), Duration::from_secs(1), || async { Ok::<_, AppError>(1) })
        .await
        .unwrap();
    assert_eq!(cache.stats().size, 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(cache.stats().size, 0);
    // still physically present until swept
    assert_eq!(cache.len(), 1);
}

/// Cached type with no serde support at all.
#[derive(Clone, Debug, PartialEq)]
struct Handle(u32);

#[tokio::test]
async fn test_memory_only_cache_needs_no_serde() {
    let cache: TtlCache<Handle> = TtlCache::default();
    let value = cache
        .fetch(&key("/handle"), TTL, || async { Ok::<_, AppError>(Handle(7)) })
        .await
        .unwrap();
    assert_eq!(value, Handle(7));
    assert_eq!(cache.get(&key("/handle")), Some(Handle(7)));
}

/// Persistent tier kept in a HashMap.
#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<String, StoredRecord>>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, key_digest: &str) -> Result<Option<StoredRecord>, AppError> {
        Ok(self.records.lock().unwrap().get(key_digest).cloned())
    }

    async fn save(&self, record: StoredRecord) -> Result<(), AppError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.key_digest.clone(), record);
        Ok(())
    }

    async fn remove(&self, key_digest: &str) -> Result<(), AppError> {
        self.records.lock().unwrap().remove(key_digest);
        Ok(())
    }

    async fn clear(&self) -> Result<usize, AppError> {
        let mut records = self.records.lock().unwrap();
        let count = records.len();
        records.clear();
        Ok(count)
    }

    async fn purge_expired(&self, now: i64) -> Result<usize, AppError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.remaining(now).is_some());
        Ok(before - records.len())
    }
}

/// Persistent tier whose disk is always full.
struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn load(&self, _key_digest: &str) -> Result<Option<StoredRecord>, AppError> {
        Err(AppError::Config("database is locked".to_string()))
    }

    async fn save(&self, _record: StoredRecord) -> Result<(), AppError> {
        Err(AppError::Config("disk quota exceeded".to_string()))
    }

    async fn remove(&self, _key_digest: &str) -> Result<(), AppError> {
        Err(AppError::Config("database is locked".to_string()))
    }

    async fn clear(&self) -> Result<usize, AppError> {
        Err(AppError::Config("database is locked".to_string()))
    }

    async fn purge_expired(&self, _now: i64) -> Result<usize, AppError> {
        Err(AppError::Config("database is locked".to_string()))
    }
}

#[tokio::test]
async fn test_persistent_tier_survives_new_cache_instance() {
    let store = Arc::new(MemoryStore::default());
    let k = key("/api/visualizations/timeline");

    let first: TtlCache<Vec<u32>> = TtlCache::with_store(store.clone());
    first
        .fetch(&k, Duration::from_secs(60), || async { Ok::<_, AppError>(vec![1, 2, 3]) })
        .await
        .unwrap();
    assert_eq!(store.records.lock().unwrap().len(), 1);

    let second: TtlCache<Vec<u32>> = TtlCache::with_store(store.clone());
    let calls = AtomicUsize::new(0);
    let value = second
        .fetch(&k, Duration::from_secs(60), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(vec![])
        })
        .await
        .unwrap();

    assert_eq!(value, vec![1, 2, 3]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.stats().hits, 1);
    assert_eq!(second.len(), 1);

    second.invalidate(&k).await;
    assert!(store.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_persistent_record_is_ignored() {
    let store = Arc::new(MemoryStore::default());
    let k = key("/api/agents");
    store
        .save(StoredRecord {
            key_digest: k.digest(),
            cache_key: k.to_string(),
            payload: b"\"stale\"".to_vec(),
            stored_at: chrono::Utc::now().timestamp() - 120,
            ttl_seconds: 60,
        })
        .await
        .unwrap();

    let cache: TtlCache<String> = TtlCache::with_store(store.clone());
    let value = cache
        .fetch(&k, TTL, || async { Ok::<_, AppError>("fresh".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "fresh");
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn test_broken_store_never_blocks_the_loader() {
    let cache: TtlCache<String> = TtlCache::with_store(Arc::new(BrokenStore));
    let k = key("/api/opportunities");

    let value = cache
        .fetch(&k, TTL, || async { Ok::<_, AppError>("rows".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "rows");

    // memory tier still works
    assert_eq!(cache.get(&k), Some("rows".to_string()));
    assert!(cache.invalidate(&k).await);
    assert_eq!(cache.clear(true).await, 0);
}
