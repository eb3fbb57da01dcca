use crate::domain::error::AppError;
use crate::domain::traits::CacheStore;
use crate::infrastructure::config::Config;
use crate::infrastructure::network::http::HttpManager;
use crate::infrastructure::pool::Pool;
use crate::infrastructure::storage::cache::TtlCache;
use crate::infrastructure::storage::sqlite::SqlitePools;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<TtlCache<Value>>,
    pub http: Pool<HttpManager>,
    pub sqlite: SqlitePools,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    /// Wire up cache and pools. `store`, when given, becomes the cache's persistent tier.
    pub fn new(
        config: Config,
        sqlite: SqlitePools,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self, AppError> {
        let manager = HttpManager::new(&config.backend.base_url)?
            .with_health_path(config.backend.health_path.clone())
            .with_request_timeout(Duration::from_secs(config.backend.request_timeout_seconds))
            .with_proxy(config.http_proxy.clone());
        let http = Pool::new(manager, config.http_pool.to_pool_config());

        let cache = match store {
            Some(store) => TtlCache::with_store(store),
            None => TtlCache::new(),
        };

        Ok(Self {
            cache: Arc::new(cache),
            http,
            sqlite,
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Close both pools. Handles still checked out are destroyed on return.
    pub fn shutdown(&self) {
        let http = self.http.close();
        let sqlite = self.sqlite.close_all();
        tracing::debug!(http, sqlite, "pools closed");
    }
}
