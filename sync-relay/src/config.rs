//! Configuration loading for giftsync-relay.
//!
//! Configuration comes from an optional TOML file, then a handful of
//! environment variables override it:
//!
//! | Variable                   | Field                       |
//! |----------------------------|-----------------------------|
//! | `WEBSOCKET_PORT`           | `server.port`               |
//! | `WEBSOCKET_HOST`           | `server.host`               |
//! | `COMPACTION_INTERVAL_SECS` | `compaction.interval_secs`  |

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "WEBSOCKET_PORT";
/// Environment variable holding the listen host.
pub const HOST_ENV: &str = "WEBSOCKET_HOST";
/// Environment variable holding the compaction interval.
pub const COMPACTION_INTERVAL_ENV: &str = "COMPACTION_INTERVAL_SECS";
/// Environment variable naming a config file.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";

/// Root configuration for giftsync-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Compaction task configuration.
    #[serde(default)]
    pub compaction: CompactionConfig,
    /// Connection and frame limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default: 0.0.0.0).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port for WebSocket and HTTP traffic (default: 5001).
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Compaction task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CompactionConfig {
    /// Seconds between compaction cycles (default: 5).
    #[serde(default = "default_compaction_interval")]
    pub interval_secs: u64,
    /// Enable the compaction task (default: true).
    #[serde(default = "default_compaction_enabled")]
    pub enabled: bool,
}

/// Connection and frame limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum live connections (default: 1000).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum size of one inbound frame in bytes (default: 1MB).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Maximum new connections per IP address per minute (default: 60).
    #[serde(default = "default_connections_per_minute")]
    pub connections_per_minute: u32,
    /// Frames buffered per connection before it is dropped as too slow (default: 256).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Serve `/metrics` (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_compaction_interval() -> u64 {
    5
}

fn default_compaction_enabled() -> bool {
    true
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_connections_per_minute() -> u32 {
    60
}

fn default_outbound_queue() -> usize {
    256
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_compaction_interval(),
            enabled: default_compaction_enabled(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            connections_per_minute: default_connections_per_minute(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` (or defaults), apply environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up through `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = parse_override(PORT_ENV, &port)?;
        }
        if let Some(host) = lookup(HOST_ENV) {
            self.server.host = host;
        }
        if let Some(secs) = lookup(COMPACTION_INTERVAL_ENV) {
            self.compaction.interval_secs = parse_override(COMPACTION_INTERVAL_ENV, &secs)?;
        }
        Ok(())
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("compaction.interval_secs", self.compaction.interval_secs == 0),
            ("limits.max_connections", self.limits.max_connections == 0),
            ("limits.max_message_size", self.limits.max_message_size == 0),
            ("limits.connections_per_minute", self.limits.connections_per_minute == 0),
            ("limits.outbound_queue", self.limits.outbound_queue == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field: *field,
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// `host:port` string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_override<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        field: key,
        reason: format!("cannot parse {value:?}"),
    })
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field or variable.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.compaction.interval_secs, 5);
        assert_eq!(config.limits.outbound_queue, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 6000

[compaction]
interval_secs = 30

[limits]
max_message_size = 2048

[http]
metrics_enabled = false
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:6000");
        assert_eq!(config.compaction.interval_secs, 30);
        assert!(config.compaction.enabled);
        assert_eq!(config.limits.max_message_size, 2048);
        assert_eq!(config.limits.connections_per_minute, 60);
        assert!(!config.http.metrics_enabled);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn environment_overrides_file() {
        let mut config: Config = toml::from_str("[server]\nport = 6000\n").unwrap();
        config
            .apply_overrides(env(&[
                ("WEBSOCKET_PORT", "7001"),
                ("COMPACTION_INTERVAL_SECS", "1"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 7001);
        assert_eq!(config.compaction.interval_secs, 1);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("WEBSOCKET_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains("WEBSOCKET_PORT"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut config = Config::default();
        config.limits.outbound_queue = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.outbound_queue"));

        let mut config = Config::default();
        config.compaction.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_connections = 3").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.limits.max_connections, 3);
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"high\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
