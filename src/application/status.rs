use crate::domain::error::AppError;
use crate::infrastructure::config::{get_config_path, get_database_path};
use crate::infrastructure::storage::db::SqliteStore;
use crate::presentation::report::StatusReport;
use crate::state::AppState;

/// Snapshot cache, pool and config state for `--status`.
pub async fn collect_status(state: &AppState) -> Result<StatusReport, AppError> {
    let config = state.config.read().await.clone();

    let persisted = if config.cache.persistent {
        let pool = state.sqlite.pool_for(&get_database_path(&config));
        Some(SqliteStore::open(pool).await?.count().await?)
    } else {
        None
    };

    Ok(StatusReport {
        backend: state.http.manager().base_url().to_string(),
        config_path: get_config_path().filter(|p| p.exists()),
        cache: state.cache.stats(),
        persisted,
        http_pool: state.http.stats(),
        sqlite_pools: state.sqlite.stats(),
    })
}
