use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener and per-connection limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Frames a connection may have queued for its writer before sends fail.
    pub max_send_queue: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    pub ping_interval_secs: u64,
    /// Bound on waiting for a dispatch loop after its connection ends.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_send_queue: 256,
            max_message_size: 65_535,
            ping_interval_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port() {
        assert_eq!(ServerConfig::default().port, 8080);
    }

    #[test]
    fn default_host_listens_everywhere() {
        assert_eq!(ServerConfig::default().bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn default_message_size() {
        assert_eq!(ServerConfig::default().max_message_size, 65_535);
    }

    #[test]
    fn default_timeouts() {
        let config = ServerConfig::default();
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_ping_interval_is_clamped() {
        let config = ServerConfig {
            ping_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_send_queue, 256);
    }
}
