use std::time::Duration;

use serde::Deserialize;

/// Worker pool and lease settings
///
/// ```ron
/// workers: (
///     concurrency: 50,
///     lease_secs: 120,
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    /// Jobs processed at once; sends are further limited by the transport
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,

    /// How long a worker may hold a job before it is handed to someone else
    #[serde(default = "defaults::lease_secs")]
    pub lease_secs: u64,

    /// Longest an idle worker sleeps before checking the queue again
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "defaults::shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::concurrency(),
            lease_secs: defaults::lease_secs(),
            poll_interval_ms: defaults::poll_interval_ms(),
            shutdown_timeout_secs: defaults::shutdown_timeout_secs(),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

mod defaults {
    pub const fn concurrency() -> usize {
        50
    }

    pub const fn lease_secs() -> u64 {
        120
    }

    pub const fn poll_interval_ms() -> u64 {
        500
    }

    pub const fn shutdown_timeout_secs() -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: WorkerConfig = ron::from_str("(concurrency: 25)").unwrap();
        assert_eq!(config.concurrency, 25);
        assert_eq!(config.lease_duration(), Duration::from_secs(120));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }
}
