// In-memory TTL cache using DashMap, with an optional persistent tier
use crate::domain::model::{CacheKey, CacheStats, StoredRecord};
use crate::domain::traits::CacheStore;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

/// Persistent tier plus the codec for `V`, fixed when the tier is attached.
struct Persistence<V> {
    store: Arc<dyn CacheStore>,
    encode: fn(&V) -> serde_json::Result<Vec<u8>>,
    decode: fn(&[u8]) -> serde_json::Result<V>,
}

/// Thread-safe memoization of idempotent reads with a hard per-entry TTL.
///
/// Expired entries are never served; they are dropped when a read runs into
/// them or on [`TtlCache::purge_expired`]. Concurrent misses on one key share a
/// single loader call.
pub struct TtlCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    inflight: DashMap<CacheKey, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    persistence: Option<Persistence<V>>,
}

/// Removes the per-key gate once no other caller is queued on it.
struct Inflight<'a, V> {
    cache: &'a TtlCache<V>,
    key: &'a CacheKey,
    gate: Arc<Mutex<()>>,
}

impl<V> Drop for Inflight<'_, V> {
    fn drop(&mut self) {
        // one reference in the map, one here
        self.cache.inflight.remove_if(self.key, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) <= 2
        });
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Cache that writes through to, and hydrates from, `store`.
    /// Values cross the tier as JSON.
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            persistence: Some(Persistence {
                store,
                encode: |value| serde_json::to_vec(value),
                decode: |bytes| serde_json::from_slice(bytes),
            }),
            ..Self::new()
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            persistence: None,
        }
    }

    /// Peek at a live entry without loading or touching the counters.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.lookup(key, Instant::now())
    }

    fn lookup(&self, key: &CacheKey, now: Instant) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    /// Return the live value for `key`, or run `loader` and cache its result for `ttl`.
    ///
    /// A loader error is returned as is and leaves the cache untouched.
    pub async fn fetch<F, Fut, E>(&self, key: &CacheKey, ttl: Duration, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(key, Instant::now()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "cache hit");
            return Ok(value);
        }

        let inflight = Inflight {
            cache: self,
            key,
            gate: self.inflight.entry(key.clone()).or_default().clone(),
        };
        let _turn = inflight.gate.clone().lock_owned().await;

        // filled while we waited on the gate
        if let Some(value) = self.lookup(key, Instant::now()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "cache hit after concurrent load");
            return Ok(value);
        }

        if let Some(value) = self.load_persisted(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "cache hit from persistent tier");
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(%key, "cache miss");
        let value = loader().await?;
        self.insert(key, value.clone(), ttl).await;
        Ok(value)
    }

    async fn insert(&self, key: &CacheKey, value: V, ttl: Duration) {
        let Some(persistence) = &self.persistence else {
            self.insert_memory(key, value, ttl);
            return;
        };

        let payload = (persistence.encode)(&value);
        self.insert_memory(key, value, ttl);
        let record = match payload {
            Ok(payload) => StoredRecord {
                key_digest: key.digest(),
                cache_key: key.to_string(),
                payload,
                stored_at: chrono::Utc::now().timestamp(),
                ttl_seconds: ttl.as_secs(),
            },
            Err(e) => {
                warn!(%key, error = %e, "cannot serialize value for persistent cache");
                return;
            }
        };
        if let Err(e) = persistence.store.save(record).await {
            warn!(%key, error = %e, "persistent cache write failed");
        }
    }

    fn insert_memory(&self, key: &CacheKey, value: V, ttl: Duration) {
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    async fn load_persisted(&self, key: &CacheKey) -> Option<V> {
        let persistence = self.persistence.as_ref()?;
        let store = &persistence.store;
        let digest = key.digest();

        let record = match store.load(&digest).await {
            Ok(Some(record)) if record.cache_key == key.as_str() => record,
            Ok(_) => return None,
            Err(e) => {
                warn!(%key, error = %e, "persistent cache read failed");
                return None;
            }
        };

        let Some(remaining) = record.remaining(chrono::Utc::now().timestamp()) else {
            if let Err(e) = store.remove(&digest).await {
                warn!(%key, error = %e, "failed to drop expired persistent entry");
            }
            return None;
        };

        match (persistence.decode)(&record.payload) {
            Ok(value) => {
                self.insert_memory(key, value.clone(), remaining);
                Some(value)
            }
            Err(e) => {
                warn!(%key, error = %e, "undecodable persistent cache entry");
                None
            }
        }
    }

    /// Remove one entry from every tier. Returns whether memory held it.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.store.remove(&key.digest()).await {
                warn!(%key, error = %e, "persistent cache invalidation failed");
            }
        }
        removed
    }

    /// Drop every entry, optionally zeroing the hit/miss counters.
    pub async fn clear(&self, reset_stats: bool) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        if reset_stats {
            self.hits.store(0, Ordering::Relaxed);
            self.misses.store(0, Ordering::Relaxed);
        }
        if let Some(persistence) = &self.persistence {
            match persistence.store.clear().await {
                Ok(count) => debug!(count, "persistent cache cleared"),
                Err(e) => warn!(error = %e, "persistent cache clear failed"),
            }
        }
        removed
    }

    /// Sweep expired entries instead of waiting for reads to trip over them.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before.saturating_sub(self.entries.len());

        if let Some(persistence) = &self.persistence {
            let now = chrono::Utc::now().timestamp();
            if let Err(e) = persistence.store.purge_expired(now).await {
                warn!(error = %e, "persistent cache purge failed");
            }
        }
        purged
    }

    /// Counters plus the number of live entries. Expired entries still in
    /// the map are not counted.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let live = self
            .entries
            .iter()
            .filter(|entry| entry.is_live(now))
            .count();
        CacheStats::new(
            live,
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Physical entry count, expired entries included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
