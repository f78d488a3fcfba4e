//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Agency owning the services published by this node (default: "default")
    pub agency: String,
    /// PostgreSQL URL; in-memory stores when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// Blob store root directory; in-memory blobs when unset
    pub storage_dir: Option<PathBuf>,
    /// Blob key prefix under which source datasets live (default: "datasets")
    pub dataset_prefix: String,
    /// Concurrent dataset constructions (default: 4)
    pub publish_workers: usize,
    /// Publishes allowed to wait for a worker (default: 64)
    pub publish_queue_capacity: usize,
    /// Construction deadline in seconds (default: 600)
    pub publish_timeout_secs: u64,
    /// Maximum items per query (default: 64)
    pub max_query_items: usize,
    /// Maximum rows one query item may address (default: 256)
    pub max_rows_per_item: usize,
    /// Credential freshness window in seconds (default: 300)
    pub credential_max_age_secs: u64,
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 8)
    pub body_limit_mb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            agency: "default".to_string(),
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            storage_dir: None,
            dataset_prefix: "datasets".to_string(),
            publish_workers: 4,
            publish_queue_capacity: 64,
            publish_timeout_secs: 600,
            max_query_items: 64,
            max_rows_per_item: 256,
            credential_max_age_secs: 300,
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 8,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // On unless RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            host,
            agency: env_string("PIR_AGENCY").unwrap_or(defaults.agency),
            database_url: env_string("DATABASE_URL"),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.database_min_connections),
            storage_dir: env_string("PIR_STORAGE_DIR").map(PathBuf::from),
            dataset_prefix: env_string("PIR_DATASET_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.dataset_prefix),
            publish_workers: env_parse("PUBLISH_WORKERS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.publish_workers),
            publish_queue_capacity: env_parse("PUBLISH_QUEUE_CAPACITY")
                .unwrap_or(defaults.publish_queue_capacity),
            publish_timeout_secs: env_parse("PUBLISH_TIMEOUT_SECS")
                .unwrap_or(defaults.publish_timeout_secs),
            max_query_items: env_parse("MAX_QUERY_ITEMS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_query_items),
            max_rows_per_item: env_parse("MAX_ROWS_PER_ITEM")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_rows_per_item),
            credential_max_age_secs: env_parse("CREDENTIAL_MAX_AGE_SECS")
                .unwrap_or(defaults.credential_max_age_secs),
            allowed_origins,
            body_limit_mb: env_parse("BODY_LIMIT_MB").unwrap_or(defaults.body_limit_mb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn credential_max_age(&self) -> Duration {
        Duration::from_secs(self.credential_max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.storage_dir.is_none());
        assert!(!config.rate_limit_enabled);
        assert!(config.publish_workers > 0);
        assert_eq!(config.max_rows_per_item, 256);
    }

    #[test]
    fn test_socket_addr() {
        let config = Config {
            host: [0, 0, 0, 0],
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.publish_timeout(), Duration::from_secs(600));
        assert_eq!(config.credential_max_age(), Duration::from_secs(300));
    }
}
