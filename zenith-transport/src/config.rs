use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{LogTransport, Sender, SmtpTransport, Transport, TransportPool};

/// Where messages go
///
/// ```ron
/// transport: Smtp((
///     host: "relay.example.com",
///     port: 587,
///     from_address: "news@example.com",
///     from_name: "Example News",
///     max_connections: 10,
/// )),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    /// Log messages instead of sending them
    Log,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Smtp(SmtpConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "defaults::host")]
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Name announced in EHLO
    #[serde(default = "defaults::helo")]
    pub helo: String,

    #[serde(default = "defaults::from_address")]
    pub from_address: String,

    #[serde(default = "defaults::from_name")]
    pub from_name: String,

    /// Concurrent sends across all workers
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,

    #[serde(default = "defaults::send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            helo: defaults::helo(),
            from_address: defaults::from_address(),
            from_name: defaults::from_name(),
            max_connections: defaults::max_connections(),
            send_timeout_secs: defaults::send_timeout_secs(),
        }
    }
}

impl TransportConfig {
    /// Build the shared, capacity-limited transport
    #[must_use]
    pub fn build(&self) -> TransportPool {
        match self {
            Self::Smtp(smtp) => {
                let sender = Sender {
                    address: smtp.from_address.clone(),
                    name: smtp.from_name.clone(),
                };
                let transport: Arc<dyn Transport> =
                    Arc::new(SmtpTransport::new(&smtp.host, smtp.port, &smtp.helo, sender));

                TransportPool::new(
                    transport,
                    smtp.max_connections,
                    Duration::from_secs(smtp.send_timeout_secs),
                )
            }
            Self::Log => TransportPool::new(
                Arc::new(LogTransport::default()),
                defaults::max_connections(),
                Duration::from_secs(defaults::send_timeout_secs()),
            ),
        }
    }
}

mod defaults {
    pub fn host() -> String {
        "localhost".to_string()
    }

    pub const fn port() -> u16 {
        25
    }

    pub fn helo() -> String {
        "localhost".to_string()
    }

    pub fn from_address() -> String {
        "no-reply@localhost".to_string()
    }

    pub fn from_name() -> String {
        "Zenith".to_string()
    }

    pub const fn max_connections() -> usize {
        10
    }

    pub const fn send_timeout_secs() -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_smtp_defaults() {
        let config: TransportConfig = ron::from_str(r#"Smtp((host: "relay.example.com"))"#).unwrap();

        assert_eq!(
            config,
            TransportConfig::Smtp(SmtpConfig {
                host: "relay.example.com".to_string(),
                ..SmtpConfig::default()
            })
        );
        assert_eq!(config.build().capacity(), 10);
    }

    #[test]
    fn test_log_transport() {
        let config: TransportConfig = ron::from_str("Log").unwrap();
        assert_eq!(config, TransportConfig::Log);
        assert_eq!(config.build().capacity(), 10);
    }

    #[test]
    fn test_max_connections() {
        let config: TransportConfig = ron::from_str("Smtp((max_connections: 2))").unwrap();
        assert_eq!(config.build().capacity(), 2);
    }
}
