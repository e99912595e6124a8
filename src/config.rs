//! Layered configuration: serde defaults, an optional file, then
//! `CONTENT_REPOSITORY__*` environment variables.

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::search::SyncSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site")]
    pub site: String,
    #[serde(default = "default_create_homepage")]
    pub create_homepage: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: default_site(),
            create_homepage: default_create_homepage(),
        }
    }
}

fn default_site() -> String {
    "default".to_string()
}

fn default_create_homepage() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Mutations allowed to execute at the same time.
    #[serde(default = "default_queue_workers")]
    pub worker_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: default_queue_workers(),
        }
    }
}

fn default_queue_workers() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_workers")]
    pub worker_count: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            worker_count: default_index_workers(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            resync_interval_secs: default_resync_interval(),
        }
    }
}

impl IndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            worker_count: self.worker_count,
            timeout: self.timeout(),
            retry_attempts: self.retry_attempts,
        }
    }
}

fn default_index_workers() -> usize {
    2
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> usize {
    3
}

fn default_resync_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bound on store reads. Writes are never cut short.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl HttpConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ObservabilityConfig {
    /// Unknown level names fall back to `INFO`.
    pub fn level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RepositoryConfig {
    /// Loads the optional file at `path`, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let builder = builder.add_source(
            Environment::with_prefix("CONTENT_REPOSITORY")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }

    pub fn load_or_default(path: Option<&Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load configuration: {}. Using defaults.", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::default();

        assert_eq!(config.site.site, "default");
        assert!(config.site.create_homepage);
        assert_eq!(config.queue.worker_count, 4);
        assert_eq!(config.index.retry_attempts, 3);
        assert_eq!(config.http.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.observability.level(), tracing::Level::INFO);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = RepositoryConfig::load(Some(Path::new("/nonexistent/repository.toml"))).unwrap();

        assert_eq!(config.cache.capacity, 1024);
        assert_eq!(config.index.timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let observability = ObservabilityConfig {
            log_level: "chatty".to_string(),
        };
        assert_eq!(observability.level(), tracing::Level::INFO);
    }
}
