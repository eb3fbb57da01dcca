use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`crate::infrastructure::pool::Pool`].
///
/// `E` is the manager's own error type, kept intact so callers can tell a
/// failed connect apart from pool backpressure.
#[derive(Error, Debug)]
pub enum PoolError<E> {
    #[error("Timed out after {0:?} waiting for a pooled resource")]
    Timeout(Duration),

    #[error("Failed to create pooled resource: {0}")]
    CreationFailed(E),

    /// Only produced on checkin; the resource is recycled and the error is logged.
    #[error("Pooled resource failed its health check: {0}")]
    HealthCheckFailed(E),

    #[error("Pool is closed")]
    Closed,
}

impl<E> PoolError<E> {
    /// Whether the error means "saturated, try again later".
    pub fn is_backpressure(&self) -> bool {
        matches!(self, PoolError::Timeout(_) | PoolError::Closed)
    }

    /// HTTP status a server-side caller should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PoolError::Timeout(_) | PoolError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::CreationFailed(_) => StatusCode::BAD_GATEWAY,
            PoolError::HealthCheckFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error of [`crate::infrastructure::pool::Pool::with_resource`]: either the
/// pool could not hand out a resource, or the scoped operation itself failed.
#[derive(Error, Debug)]
pub enum WithResourceError<E, F> {
    #[error(transparent)]
    Pool(PoolError<E>),

    #[error(transparent)]
    Operation(F),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("Pool error: {0}")]
    Pool(String),
}

impl AppError {
    pub fn from_pool<E: std::fmt::Display>(err: PoolError<E>) -> Self {
        AppError::Pool(err.to_string())
    }
}

impl<F> From<WithResourceError<AppError, F>> for AppError
where
    F: Into<AppError>,
{
    fn from(err: WithResourceError<AppError, F>) -> Self {
        match err {
            WithResourceError::Pool(e) => AppError::from_pool(e),
            WithResourceError::Operation(e) => e.into(),
        }
    }
}
