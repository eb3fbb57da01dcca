use crate::domain::error::AppError;
use crate::domain::model::StoredRecord;
use async_trait::async_trait;

/// Creates and vets the resources held by a pool.
///
/// A pool owns exactly one manager. `create` is where the expensive setup
/// (connect, file open) happens; `check` is the cheap liveness probe run on
/// every checkin.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    type Resource: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    async fn check(&self, resource: &mut Self::Resource) -> Result<(), Self::Error>;
}

/// Second cache tier that outlives the process.
///
/// Errors are reported but never fatal: the cache logs them and falls back to
/// the loader.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, key_digest: &str) -> Result<Option<StoredRecord>, AppError>;

    async fn save(&self, record: StoredRecord) -> Result<(), AppError>;

    async fn remove(&self, key_digest: &str) -> Result<(), AppError>;

    async fn clear(&self) -> Result<usize, AppError>;

    /// Drop records whose freshness ended at or before `now` (unix seconds).
    async fn purge_expired(&self, now: i64) -> Result<usize, AppError>;
}
