// Pooled HTTP connections to the dashboard backend
use crate::domain::error::AppError;
use crate::domain::traits::Manager;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, Proxy, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

static USER_AGENT: Lazy<String> =
    Lazy::new(|| format!("robobrain-cache/{}", env!("CARGO_PKG_VERSION")));

/// Resolve `path` against `base`, keeping any path prefix on the base URL.
pub fn resolve(base: &Url, path: &str) -> Result<Url, AppError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| AppError::Config(format!("Invalid request path '{}': {}", path, e)))
}

/// One HTTP "connection": a client bound to a single origin.
pub struct HttpConnection {
    client: Client,
    base_url: Url,
}

impl HttpConnection {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` and return the status with the decoded body.
    ///
    /// Bodies that are not JSON come back as a JSON string.
    pub async fn get_json(&self, path: &str) -> Result<(StatusCode, Value), AppError> {
        let url = resolve(&self.base_url, path)?;
        let request_id = Uuid::new_v4().to_string();
        debug!(%url, %request_id, "GET");

        let response = self
            .client
            .get(url)
            .header("x-request-id", &request_id)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok((status, body))
    }
}

/// Creates [`HttpConnection`]s for one backend origin.
#[derive(Debug, Clone)]
pub struct HttpManager {
    base_url: Url,
    health_path: Option<String>,
    request_timeout: Duration,
    proxy: Option<String>,
}

impl HttpManager {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid backend URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            health_path: None,
            request_timeout: Duration::from_secs(30),
            proxy: None,
        })
    }

    pub fn with_health_path(mut self, path: Option<String>) -> Self {
        self.health_path = path.filter(|p| !p.is_empty());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.is_empty());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> Result<Url, AppError> {
        resolve(&self.base_url, path)
    }
}

#[async_trait]
impl Manager for HttpManager {
    type Resource = HttpConnection;
    type Error = AppError;

    async fn create(&self) -> Result<HttpConnection, AppError> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(self.request_timeout)
            .user_agent(USER_AGENT.as_str());
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(HttpConnection {
            client: builder.build()?,
            base_url: self.base_url.clone(),
        })
    }

    async fn check(&self, conn: &mut HttpConnection) -> Result<(), AppError> {
        let Some(path) = &self.health_path else {
            return Ok(());
        };

        let url = resolve(&self.base_url, path)?;
        let status = conn.client.head(url).send().await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::Api(format!("Health check returned {}", status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_prefix() {
        let manager = HttpManager::new("http://localhost:5000/robobrain").unwrap();
        assert_eq!(manager.base_url().as_str(), "http://localhost:5000/robobrain/");
        assert_eq!(
            manager.url_for("/api/visualizations/graph").unwrap().as_str(),
            "http://localhost:5000/robobrain/api/visualizations/graph"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpManager::new("not a url"),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn creates_connection_without_network() {
        let manager = HttpManager::new("http://127.0.0.1:9").unwrap();
        let mut conn = manager.create().await.unwrap();
        assert_eq!(conn.base_url().as_str(), "http://127.0.0.1:9/");
        // no health path configured: always healthy
        assert!(manager.check(&mut conn).await.is_ok());
    }
}
