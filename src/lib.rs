//! Response cache and resource pools for the Robobrain dashboard API.
//!
//! - [`TtlCache`]: hard-TTL memoization of idempotent reads, with coalesced
//!   concurrent misses and an optional persistent tier.
//! - [`Pool`]: bounded, health-checked pool of expensive resources, with
//!   managers for HTTP clients and SQLite handles.
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod presentation;
pub mod state;

pub use domain::error::{AppError, PoolError, WithResourceError};
pub use domain::model::{CacheKey, CacheStats, PoolConfig, PoolStats};
pub use domain::traits::{CacheStore, Manager};
pub use infrastructure::pool::{Pool, PooledObject};
pub use infrastructure::storage::cache::TtlCache;
