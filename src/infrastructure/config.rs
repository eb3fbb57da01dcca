use crate::domain::error::AppError;
use crate::domain::model::PoolConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub http_proxy: Option<String>,
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default = "default_http_pool")]
    pub http_pool: PoolSettings,
    #[serde(default = "default_sqlite_pool")]
    pub sqlite_pool: PoolSettings,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Backend {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub health_path: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_enable")]
    pub persistent: bool,
    pub database_path: Option<String>,
    /// Path prefix -> TTL; the longest matching prefix wins.
    #[serde(default = "default_route_ttls")]
    pub route_ttls: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolSettings {
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
    pub max_idle_seconds: Option<u64>,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub path: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            enable: true,
            path: None,
            level: "WARN".to_string(),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            health_path: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            persistent: true,
            database_path: None,
            route_ttls: default_route_ttls(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_proxy: None,
            enable_color: true,
            backend: Backend::default(),
            cache: CacheSettings::default(),
            http_pool: default_http_pool(),
            sqlite_pool: default_sqlite_pool(),
            logging: Logging::default(),
        }
    }
}

impl CacheSettings {
    /// TTL for a request path: longest matching route prefix, else the default.
    pub fn ttl_for(&self, path: &str) -> Duration {
        let path = format!("/{}", path.trim_start_matches('/'));
        let secs = self
            .route_ttls
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.ttl_seconds);
        Duration::from_secs(secs)
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_pool_size,
            max_age: Duration::from_secs(self.max_age_seconds),
            max_idle: self.max_idle_seconds.map(Duration::from_secs),
            acquire_timeout: Duration::from_secs(self.acquire_timeout_seconds),
        }
    }
}

// Defaults
fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_ttl() -> u64 {
    300
}
fn default_route_ttls() -> BTreeMap<String, u64> {
    // visualizations are regenerated often on the backend
    BTreeMap::from([("/api/visualizations".to_string(), 60)])
}
fn default_max_pool_size() -> usize {
    8
}
fn default_max_age() -> u64 {
    600
}
fn default_acquire_timeout() -> u64 {
    5
}
fn default_http_pool() -> PoolSettings {
    PoolSettings {
        max_pool_size: default_max_pool_size(),
        max_age_seconds: default_max_age(),
        max_idle_seconds: Some(90),
        acquire_timeout_seconds: default_acquire_timeout(),
    }
}
fn default_sqlite_pool() -> PoolSettings {
    PoolSettings {
        max_pool_size: 4,
        max_age_seconds: 3600,
        max_idle_seconds: None,
        acquire_timeout_seconds: default_acquire_timeout(),
    }
}
fn default_enable_color() -> bool {
    true
}
fn default_enable() -> bool {
    true
}
fn default_log_level() -> String {
    "WARN".to_string()
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("robobrain").join("config.toml"))
}

/// Persistent cache database (config directory unless overridden)
pub fn get_database_path(config: &Config) -> PathBuf {
    if let Some(path) = config.cache.database_path.as_deref() {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("robobrain")
        .join("cache.db")
}

/// Parse a config file body and validate it.
pub fn parse_config(content: &str) -> Result<Config, AppError> {
    let config = toml::from_str::<Config>(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), AppError> {
    for (name, pool) in [("http_pool", &config.http_pool), ("sqlite_pool", &config.sqlite_pool)] {
        if pool.max_pool_size == 0 {
            return Err(AppError::Config(format!(
                "{}.max_pool_size must be at least 1",
                name
            )));
        }
    }
    if config.cache.ttl_seconds == 0 {
        return Err(AppError::Config(
            "cache.ttl_seconds must be at least 1".to_string(),
        ));
    }
    if let Some((prefix, _)) = config.cache.route_ttls.iter().find(|(_, ttl)| **ttl == 0) {
        return Err(AppError::Config(format!(
            "cache.route_ttls.\"{}\" must be at least 1",
            prefix
        )));
    }
    Ok(())
}

/// Apply `ROBOBRAIN_*` environment overrides.
///
/// `ROBOBRAIN_CACHE_TTL` sets one TTL for every path: it replaces
/// `cache.ttl_seconds` and drops the `cache.route_ttls` overrides.
/// Unparseable or zero values are ignored.
pub fn apply_env_overrides(config: &mut Config, vars: impl Fn(&str) -> Option<String>) {
    if let Some(url) = vars("ROBOBRAIN_BASE_URL").filter(|v| !v.is_empty()) {
        config.backend.base_url = url;
    }
    if let Some(ttl) = vars("ROBOBRAIN_CACHE_TTL").and_then(|v| v.parse::<u64>().ok()) {
        if ttl > 0 {
            config.cache.ttl_seconds = ttl;
            config.cache.route_ttls.clear();
        }
    }
}

pub fn load_config() -> Result<Config, AppError> {
    let mut config = Config::default();

    if let Some(path) = get_config_path() {
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            match parse_config(&content) {
                Ok(parsed) => config = parsed,
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to parse config file: {}. Using defaults.",
                        e
                    );
                }
            }
        }
    }

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

pub fn generate_config_sample() -> Result<(), AppError> {
    let config_path = get_config_path();

    if let Some(path) = config_path {
        if path.exists() {
            eprintln!("Config file already exists at: {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let sample = Config::default();
        let toml_content = toml::to_string_pretty(&sample)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, toml_content)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;
        println!("Generated config file at: {}", path.display());
    } else {
        return Err(AppError::Config(
            "Cannot determine config directory".to_string(),
        ));
    }

    Ok(())
}
