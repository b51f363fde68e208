//! Server configuration.

use crate::error::{Result, ViewerError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the page server and the remote logger.
///
/// Every field has a default, so a JSON file only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind the server to
    pub host: String,
    /// Port to serve the page on
    pub port: u16,
    /// Log file rendered on every request
    pub log_path: PathBuf,
    /// Client auto-refresh cadence in seconds
    pub refresh_interval_secs: u32,
    /// Show the last line of the log first
    pub newest_first: bool,
    /// External diagnostic command; `None` uses the native sensor source
    pub sensor_command: Option<String>,
    /// Upper bound on a single sensor invocation
    pub sensor_timeout_ms: u64,
    /// Maximum number of connections handled at once
    pub max_connections: usize,
    /// Bytes read (and discarded) from each client before responding
    pub read_buffer_size: usize,
    /// How long to wait for client bytes before responding anyway
    pub read_timeout_ms: u64,
    /// Port of the line-logger-over-socket listener
    pub remote_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_PORT,
            log_path: PathBuf::from(crate::DEFAULT_LOG_FILE),
            refresh_interval_secs: crate::DEFAULT_REFRESH_SECS,
            newest_first: true,
            sensor_command: Some(crate::DEFAULT_SENSOR_COMMAND.to_string()),
            sensor_timeout_ms: 5000,
            max_connections: 64,
            read_buffer_size: 1024,
            read_timeout_ms: 1000,
            remote_port: crate::DEFAULT_REMOTE_PORT,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ViewerError::config_error(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the host for the server.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the page server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the log file path.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Set the client refresh interval.
    pub fn with_refresh_interval(mut self, secs: u32) -> Self {
        self.refresh_interval_secs = secs;
        self
    }

    /// Choose newest-first (reversed) or file-order display.
    pub fn with_newest_first(mut self, newest_first: bool) -> Self {
        self.newest_first = newest_first;
        self
    }

    /// Set the external sensor command, or `None` for native readings.
    pub fn with_sensor_command(mut self, command: Option<String>) -> Self {
        self.sensor_command = command;
        self
    }

    /// Set the sensor timeout.
    pub fn with_sensor_timeout_ms(mut self, ms: u64) -> Self {
        self.sensor_timeout_ms = ms;
        self
    }

    /// Set the maximum number of concurrently handled connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the client read timeout.
    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    /// Set the remote logger port.
    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    /// Get the full bind address of the page server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the full bind address of the remote logger.
    pub fn remote_bind_address(&self) -> String {
        format!("{}:{}", self.host, self.remote_port)
    }

    /// Parse the page server address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.bind_address())
    }

    /// Parse the remote logger address.
    pub fn remote_socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.remote_bind_address())
    }

    /// Upper bound on one sensor command run.
    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// How long a client gets to send its request before the page is sent anyway.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.refresh_interval_secs == 0 {
            return Err(ViewerError::config_error(
                "refresh_interval_secs must be at least 1",
            ));
        }
        if self.max_connections == 0 {
            return Err(ViewerError::config_error("max_connections must be at least 1"));
        }
        if self.read_buffer_size == 0 {
            return Err(ViewerError::config_error("read_buffer_size must be at least 1"));
        }
        if let Some(command) = &self.sensor_command {
            if command.trim().is_empty() {
                return Err(ViewerError::config_error("sensor_command is empty"));
            }
        }
        Ok(())
    }
}

fn parse_addr(address: &str) -> Result<SocketAddr> {
    address
        .parse::<SocketAddr>()
        .map_err(|e| ViewerError::config_error(format!("Invalid bind address {}: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, crate::DEFAULT_PORT);
        assert_eq!(config.refresh_interval_secs, 5);
        assert!(config.newest_first);
        assert_eq!(config.sensor_command.as_deref(), Some("sensors"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::new("127.0.0.1", 9000)
            .with_log_path("/tmp/app.log")
            .with_refresh_interval(2)
            .with_newest_first(false)
            .with_sensor_command(None);

        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.log_path, PathBuf::from("/tmp/app.log"));
        assert_eq!(config.refresh_interval_secs, 2);
        assert!(!config.newest_first);
        assert!(config.sensor_command.is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(ServerConfig::default().with_host("not a host").validate().is_err());
        assert!(ServerConfig::default().with_refresh_interval(0).validate().is_err());
        assert!(ServerConfig::default().with_max_connections(0).validate().is_err());
        assert!(ServerConfig::default()
            .with_sensor_command(Some("  ".to_string()))
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 9999, "log_path": "/srv/log.txt", "sensor_command": null }}"#).unwrap();

        let config = ServerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.log_path, PathBuf::from("/srv/log.txt"));
        assert!(config.sensor_command.is_none());
        assert_eq!(config.refresh_interval_secs, crate::DEFAULT_REFRESH_SECS);
    }

    #[test]
    fn test_missing_json_file() {
        let err = ServerConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ViewerError::Config(_)));
    }
}
