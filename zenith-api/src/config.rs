use std::time::Duration;

use serde::Deserialize;

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Address to bind
    ///
    /// Common values:
    /// - `[::]:3000` (IPv6 any address)
    /// - `0.0.0.0:3000` (IPv4 any address)
    /// - `127.0.0.1:3000` (localhost only)
    #[serde(default = "defaults::listen_address")]
    pub listen_address: String,

    /// Base URL recipients reach this server at, used to build pixel URLs
    #[serde(default = "defaults::public_url")]
    pub public_url: String,

    /// Timeout for API and health requests; pixel loads are not subject to it
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Longest a pixel load waits for its open to be recorded
    #[serde(default = "defaults::open_wait_ms")]
    pub open_wait_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: defaults::listen_address(),
            public_url: defaults::public_url(),
            request_timeout_secs: defaults::request_timeout_secs(),
            open_wait_ms: defaults::open_wait_ms(),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn open_wait(&self) -> Duration {
        Duration::from_millis(self.open_wait_ms)
    }
}

/// Readiness thresholds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthConfig {
    /// Readiness fails once this many jobs are waiting or in flight
    #[serde(default = "defaults::max_queue_depth")]
    pub max_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: defaults::max_queue_depth(),
        }
    }
}

mod defaults {
    pub fn listen_address() -> String {
        "[::]:3000".to_string()
    }

    pub fn public_url() -> String {
        "http://localhost:3000".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        10
    }

    pub const fn open_wait_ms() -> u64 {
        250
    }

    pub const fn max_queue_depth() -> usize {
        100_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ApiConfig = ron::from_str(r#"(public_url: "https://mail.example.com")"#).unwrap();
        assert_eq!(config.listen_address, "[::]:3000");
        assert_eq!(config.public_url, "https://mail.example.com");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.open_wait(), Duration::from_millis(250));

        let health: HealthConfig = ron::from_str("()").unwrap();
        assert_eq!(health.max_queue_depth, 100_000);
    }
}
