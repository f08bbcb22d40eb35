use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::gate::OfflinePolicy;
use crate::sync::SyncConfig;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/ticketgate";
const DEFAULT_LOCAL_QUEUE_URL: &str = "sqlite://offline_queue.db";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    /// Hosted PostgreSQL holding tickets.
    pub database_url: String,
    /// SQLite file backing the offline queue.
    pub local_queue_url: String,
    pub bind_addr: SocketAddr,
    /// How long to wait for a remote connection before going offline.
    pub remote_timeout: Duration,
    pub max_connections: u32,
    pub probe_interval: Duration,
    pub sync: SyncConfig,
    pub offline_policy: OfflinePolicy,
    pub run_migrations: bool,
    pub cors_allowed_origins: String,
    /// Enables HSTS.
    pub production: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SyncConfig::default();

        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            local_queue_url: lookup("LOCAL_QUEUE_URL")
                .unwrap_or_else(|| DEFAULT_LOCAL_QUEUE_URL.to_string()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001))),
            remote_timeout: Duration::from_secs(parse_or(&lookup, "REMOTE_TIMEOUT_SECS", 3)),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5),
            probe_interval: Duration::from_secs(parse_or(&lookup, "PROBE_INTERVAL_SECS", 5)),
            sync: SyncConfig {
                interval: Duration::from_secs(parse_or(
                    &lookup,
                    "SYNC_INTERVAL_SECS",
                    defaults.interval.as_secs(),
                )),
                batch_size: parse_or(&lookup, "SYNC_BATCH_SIZE", defaults.batch_size),
                max_retries: parse_or(&lookup, "SYNC_MAX_RETRIES", defaults.max_retries),
                retention: chrono::Duration::hours(parse_or(
                    &lookup,
                    "QUEUE_RETENTION_HOURS",
                    defaults.retention.num_hours(),
                )),
            },
            offline_policy: OfflinePolicy {
                reject_unknown: parse_or(&lookup, "OFFLINE_REJECT_UNKNOWN", false),
            },
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: lookup("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        }
    }
}

/// Parses `key` when set; a malformed value is logged and replaced by `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.local_queue_url, DEFAULT_LOCAL_QUEUE_URL);
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 3001)));
        assert_eq!(config.remote_timeout, Duration::from_secs(3));
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.retention, chrono::Duration::hours(72));
        assert!(!config.offline_policy.reject_unknown);
        assert!(config.run_migrations);
        assert!(!config.production);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("SYNC_INTERVAL_SECS", "30"),
            ("SYNC_MAX_RETRIES", "2"),
            ("OFFLINE_REJECT_UNKNOWN", "true"),
            ("RUN_MIGRATIONS", "false"),
            ("RUST_ENV", "Production"),
        ]);
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.sync.interval, Duration::from_secs(30));
        assert_eq!(config.sync.max_retries, 2);
        assert!(config.offline_policy.reject_unknown);
        assert!(!config.run_migrations);
        assert!(config.production);
    }

    #[test]
    fn test_malformed_values_fall_back_to_defaults() {
        let config = config(&[("SYNC_BATCH_SIZE", "lots"), ("BIND_ADDR", "nowhere")]);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 3001)));
    }
}
