use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

// 缓存键: 由请求方法和规范化后的 URL 组成
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a request's identity.
    ///
    /// Query pairs are sorted and the fragment dropped, so `?b=2&a=1` and
    /// `?a=1&b=2#top` land on the same entry.
    pub fn for_request(method: &Method, url: &Url) -> Self {
        let mut normalized = url.clone();
        normalized.set_fragment(None);

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            normalized.set_query(None);
        } else {
            pairs.sort();
            normalized.query_pairs_mut().clear().extend_pairs(pairs);
        }

        Self(format!("{} {}", method.as_str().to_uppercase(), normalized))
    }

    /// Key for a plain GET.
    pub fn get(url: &Url) -> Self {
        Self::for_request(&Method::GET, url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the key, hex encoded. Used as the persistent tier's primary key.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

// 缓存统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(size: usize, hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            size,
            hits,
            misses,
            hit_rate,
        }
    }
}

// 连接池统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub recycled: u64,
    pub active: usize, // 已借出 (含创建中)
    pub idle: usize,
    pub waiting: usize,
    pub max_size: usize,
}

/// Limits for a [`crate::infrastructure::pool::Pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: usize,
    pub max_age: Duration,
    /// Idle bound checked when an idle resource is picked up. `None` disables it.
    pub max_idle: Option<Duration>,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            max_age: Duration::from_secs(600),
            max_idle: None,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

// 持久化缓存记录
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key_digest: String,
    pub cache_key: String,
    pub payload: Vec<u8>, // 未压缩的 JSON
    pub stored_at: i64,   // unix 秒
    pub ttl_seconds: u64,
}

impl StoredRecord {
    /// Seconds of freshness left at `now` (unix seconds), or `None` once expired.
    pub fn remaining(&self, now: i64) -> Option<Duration> {
        let age = now.saturating_sub(self.stored_at).max(0) as u64;
        if age < self.ttl_seconds {
            Some(Duration::from_secs(self.ttl_seconds - age))
        } else {
            None
        }
    }
}

/// One fetched backend resource, as shown by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub path: String,
    pub body: serde_json::Value,
    pub source: FetchSource,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Backend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_query_order_and_fragment() {
        let a = Url::parse("http://host/api/visualizations/x?b=2&a=1").unwrap();
        let b = Url::parse("http://host/api/visualizations/x?a=1&b=2#top").unwrap();
        assert_eq!(CacheKey::get(&a), CacheKey::get(&b));
        assert_eq!(
            CacheKey::get(&a).as_str(),
            "GET http://host/api/visualizations/x?a=1&b=2"
        );
    }

    #[test]
    fn key_distinguishes_method_and_path() {
        let url = Url::parse("http://host/api/a").unwrap();
        let other = Url::parse("http://host/api/b").unwrap();
        assert_ne!(CacheKey::get(&url), CacheKey::for_request(&Method::HEAD, &url));
        assert_ne!(CacheKey::get(&url), CacheKey::get(&other));
        assert_eq!(CacheKey::get(&url).digest().len(), 64);
    }

    #[test]
    fn hit_rate_is_zero_without_traffic() {
        let stats = CacheStats::new(0, 0, 0);
        assert_eq!(stats.hit_rate, 0.0);
        let stats = CacheStats::new(1, 3, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn stored_record_expires_on_ttl_boundary() {
        let record = StoredRecord {
            key_digest: "d".into(),
            cache_key: "k".into(),
            payload: Vec::new(),
            stored_at: 1_000,
            ttl_seconds: 10,
        };
        assert_eq!(record.remaining(1_004), Some(Duration::from_secs(6)));
        assert_eq!(record.remaining(1_010), None);
    }
}
