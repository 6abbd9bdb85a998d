//! Sync engine configuration.

use std::time::Duration;

/// Configuration for the sync engine and its collaborators.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote REST API (no trailing slash).
    pub api_url: String,
    /// Path of the reachability health endpoint, relative to `api_url`.
    pub health_path: String,
    /// Per-request timeout for remote calls. A hung remote call must never
    /// block an operation indefinitely.
    pub request_timeout: Duration,
    /// Period of the background sync worker.
    pub sync_interval: Duration,
    /// How many backup snapshots to retain before evicting the oldest.
    pub backup_retention: usize,
    /// Period of the simulated inbound event feed.
    pub feed_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001/api".to_string(),
            health_path: "/health".to_string(),
            request_timeout: Duration::from_secs(15),
            sync_interval: Duration::from_secs(30),
            backup_retention: 5,
            feed_interval: Duration::from_secs(45),
        }
    }
}

impl SyncConfig {
    /// Build a config from `MAGAZZINO_*` environment variables, falling back
    /// to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("MAGAZZINO_API_URL").unwrap_or(defaults.api_url),
            health_path: std::env::var("MAGAZZINO_HEALTH_PATH").unwrap_or(defaults.health_path),
            request_timeout: env_secs("MAGAZZINO_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout),
            sync_interval: env_secs("MAGAZZINO_SYNC_INTERVAL_SECS")
                .unwrap_or(defaults.sync_interval),
            backup_retention: std::env::var("MAGAZZINO_BACKUP_RETENTION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backup_retention),
            feed_interval: env_secs("MAGAZZINO_FEED_INTERVAL_SECS")
                .unwrap_or(defaults.feed_interval),
        }
    }

    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> String {
        format!("{}{}", self.api_url, self.health_path)
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = SyncConfig::default();
        assert_eq!(config.backup_retention, 5);
        assert_eq!(config.health_url(), "http://localhost:3001/api/health");
    }
}
