use crate::domain::error::AppError;
use crate::domain::model::{CacheKey, FetchResult, FetchSource};
use crate::infrastructure::network::client::fetch_resource;
use crate::state::AppState;
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Fetch one API path: response cache first, pooled backend call on a miss.
pub async fn fetch_path(
    state: &AppState,
    path: &str,
    no_cache: bool,
) -> Result<FetchResult, AppError> {
    let started = Instant::now();

    if no_cache {
        let body = load_from_backend(state, path).await?;
        return Ok(FetchResult {
            path: path.to_string(),
            body,
            source: FetchSource::Backend,
            elapsed_ms: started.elapsed().as_millis(),
        });
    }

    let url = state.http.manager().url_for(path)?;
    let ttl = state.config.read().await.cache.ttl_for(path);
    let key = CacheKey::get(&url);

    let loaded = AtomicBool::new(false);
    let loaded_ref = &loaded;
    let body = state
        .cache
        .fetch(&key, ttl, move || async move {
            loaded_ref.store(true, Ordering::Relaxed);
            load_from_backend(state, path).await
        })
        .await?;

    let source = if loaded.load(Ordering::Relaxed) {
        FetchSource::Backend
    } else {
        FetchSource::Cache
    };

    Ok(FetchResult {
        path: path.to_string(),
        body,
        source,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// Fetch every path concurrently; results keep the input order.
pub async fn fetch_all(
    state: &AppState,
    paths: &[String],
    no_cache: bool,
) -> Vec<Result<FetchResult, AppError>> {
    join_all(paths.iter().map(|path| fetch_path(state, path, no_cache))).await
}

/// Evict one path from memory and the persistent tier.
pub async fn invalidate_path(state: &AppState, path: &str) -> Result<bool, AppError> {
    let url = state.http.manager().url_for(path)?;
    Ok(state.cache.invalidate(&CacheKey::get(&url)).await)
}

async fn load_from_backend(state: &AppState, path: &str) -> Result<Value, AppError> {
    let path = path.to_string();
    let body = state
        .http
        .with_resource(move |conn| Box::pin(async move { fetch_resource(conn, &path).await }))
        .await?;
    Ok(body)
}
