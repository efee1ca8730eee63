//! Configuration module for the nice-mock server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values. The simulation
//! parameters (session cap, response size range, delay range, read timeout)
//! are fixed and only reachable through [`Config`] fields.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Width of the decimal length header in front of every message.
pub const HEADER_SIZE: usize = 10;

/// Maximum number of simultaneously admitted sessions.
pub const MAX_SESSIONS: usize = 100;

/// Response payload size range in bytes (10KB to 14KB, both inclusive).
pub const MIN_RESPONSE_BYTES: usize = 10 * 1024;
pub const MAX_RESPONSE_BYTES: usize = 14 * 1024;

/// Simulated processing delay range in milliseconds (both inclusive).
pub const MIN_DELAY_MS: u64 = 500;
pub const MAX_DELAY_MS: u64 = 2000;

/// Per-session read timeout.
pub const READ_TIMEOUT_MS: u64 = 30_000;

/// Command-line arguments for the mock server
#[derive(Parser, Debug, Default)]
#[command(name = "nice-mock")]
#[command(author = "nice-mock authors")]
#[command(version = "0.1.0")]
#[command(about = "Mock endpoint for the length-prefixed EUC-KR partner protocol", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (e.g., 0.0.0.0)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of concurrently running session workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// How long to wait for in-flight sessions on shutdown, in milliseconds
    #[arg(long)]
    pub shutdown_grace_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_workers() -> usize {
    50
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration. Created once at startup and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_workers: usize,
    pub max_sessions: usize,
    pub min_response_bytes: usize,
    pub max_response_bytes: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_parts(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        let config = Config::from_parts(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI args over TOML values and fill in the fixed simulation
    /// parameters.
    pub fn from_parts(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let server = toml_config.server;

        Config {
            host: cli.host.unwrap_or(server.host),
            port: cli.port.unwrap_or(server.port),
            max_workers: cli.workers.unwrap_or(server.workers),
            max_sessions: MAX_SESSIONS,
            min_response_bytes: MIN_RESPONSE_BYTES,
            max_response_bytes: MAX_RESPONSE_BYTES,
            min_delay_ms: MIN_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            read_timeout_ms: READ_TIMEOUT_MS,
            shutdown_grace_ms: cli.shutdown_grace_ms.unwrap_or(server.shutdown_grace_ms),
            // clap fills in "info" when the flag is absent, so only a
            // non-default CLI value overrides the file
            log_level: if cli.log_level.is_empty() || cli.log_level == "info" {
                toml_config.logging.level
            } else {
                cli.log_level
            },
        }
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max sessions must be at least 1".into()));
        }
        if self.min_response_bytes > self.max_response_bytes {
            return Err(ConfigError::Invalid(format!(
                "response size range is inverted: {} > {}",
                self.min_response_bytes, self.max_response_bytes
            )));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "delay range is inverted: {} > {}",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Address string the listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_workers, 50);
        assert_eq!(config.max_sessions, 100);
        assert_eq!(config.min_response_bytes, 10240);
        assert_eq!(config.max_response_bytes, 14336);
        assert_eq!(config.min_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 2000);
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 21003
            workers = 8
            shutdown_grace_ms = 100

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let config = Config::from_parts(CliArgs::default(), toml_config);
        assert_eq!(config.bind_addr(), "127.0.0.1:21003");
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.shutdown_grace_ms, 100);
        assert_eq!(config.log_level, "debug");
        // fixed parameters are not configurable from the file
        assert_eq!(config.max_sessions, MAX_SESSIONS);
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str("[server]\nport = 1234\nworkers = 2\n").unwrap();
        let cli = CliArgs {
            port: Some(4321),
            log_level: "warn".to_string(),
            ..CliArgs::default()
        };

        let config = Config::from_parts(cli, toml_config);
        assert_eq!(config.port, 4321);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            max_workers: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.max_workers = 1;
        config.min_delay_ms = 10;
        config.max_delay_ms = 5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
