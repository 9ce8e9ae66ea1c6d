//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Flat ClickHouse environment variables (CLICKHOUSE_HOST, CLICKHOUSE_USER, ...)
//! - Nested environment variables (MCP_CLICKHOUSE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [clickhouse]
//! host = "play.clickhouse.com"
//! username = "explorer"
//! secure = true
//!
//! [execution]
//! pool_size = 10
//! query_timeout_secs = 30
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CLICKHOUSE_HOST=localhost CLICKHOUSE_SECURE=false
//! MCP_CLICKHOUSE_EXECUTION__QUERY_TIMEOUT_SECS=60
//! MCP_CLICKHOUSE_LOGGING__FORMAT=json
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::execution::{DEFAULT_CACHE_CAPACITY, DEFAULT_POOL_SIZE, DEFAULT_QUERY_TIMEOUT};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Sources could not be read or merged
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// A required field is missing or empty
    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    /// A field has an unusable value
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// ClickHouse connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// Server host name
    #[serde(default, deserialize_with = "lossy_string")]
    pub host: String,

    /// Server port (default 8443 when secure, 8123 otherwise)
    #[serde(default)]
    pub port: Option<u16>,

    /// User name
    #[serde(default, alias = "user", deserialize_with = "lossy_string")]
    pub username: String,

    /// Password (never serialized, never logged)
    #[serde(default, skip_serializing, deserialize_with = "lossy_string")]
    pub password: String,

    /// Use HTTPS
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Verify the server's TLS certificate
    #[serde(default = "default_true")]
    pub verify: bool,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Per-request send/receive timeout in seconds
    #[serde(default = "default_send_receive_timeout")]
    pub send_receive_timeout: u64,

    /// Default database for unqualified table names
    #[serde(default, deserialize_with = "lossy_optional_string")]
    pub database: Option<String>,
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of queries allowed to execute concurrently
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Deadline applied to each `run_select_query` call, in seconds
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Maximum number of memoized query results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Maximum queries waiting for a worker. 0 = unbounded.
    #[serde(default)]
    pub max_queued: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// MCP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name reported in `initialize`
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Markdown file whose contents are sent as server instructions
    #[serde(default)]
    pub instructions: Option<PathBuf>,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_send_receive_timeout() -> u64 {
    20
}
fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}
fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT.as_secs()
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_server_name() -> String {
    "mcp-clickhouse".to_string()
}

// Environment values like CLICKHOUSE_PASSWORD=12345 arrive as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    UInt(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::UInt(v) => v.to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Bool(v) => v.to_string(),
        }
    }
}

fn lossy_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(Scalar::into_string)
}

fn lossy_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(Scalar::into_string)
        .filter(|s| !s.is_empty()))
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. CLICKHOUSE_* variables into `[clickhouse]`
    /// 4. Environment variables (MCP_CLICKHOUSE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(
            Figment::new()
                .merge(Toml::file("config.toml"))
                .merge(Toml::file("config.local.toml")),
        )
        .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Self::figment(Figment::new().merge(Toml::file(path))).extract()
    }

    fn figment(files: Figment) -> Figment {
        files
            .merge(
                Env::prefixed("CLICKHOUSE_")
                    .map(|key| format!("clickhouse.{key}").into()),
            )
            .merge(Env::prefixed("MCP_CLICKHOUSE_").split("__"))
    }

    /// Check every field the connection and runner depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ch = &self.clickhouse;
        if ch.host.trim().is_empty() {
            return Err(ConfigError::Missing("clickhouse.host"));
        }
        if ch.username.trim().is_empty() {
            return Err(ConfigError::Missing("clickhouse.username"));
        }
        if ch.port == Some(0) {
            return Err(ConfigError::Invalid {
                field: "clickhouse.port",
                reason: "port must be non-zero".to_string(),
            });
        }
        if ch.connect_timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "clickhouse.connect_timeout",
                reason: "timeout must be at least one second".to_string(),
            });
        }
        if ch.send_receive_timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "clickhouse.send_receive_timeout",
                reason: "timeout must be at least one second".to_string(),
            });
        }

        let exec = &self.execution;
        if exec.pool_size == 0 {
            return Err(ConfigError::Invalid {
                field: "execution.pool_size",
                reason: "at least one worker is required".to_string(),
            });
        }
        if exec.query_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "execution.query_timeout_secs",
                reason: "deadline must be at least one second".to_string(),
            });
        }
        if exec.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "execution.cache_capacity",
                reason: "cache must hold at least one entry".to_string(),
            });
        }
        Ok(())
    }

    /// Validate and assemble the immutable connection settings.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        self.validate()?;
        let ch = &self.clickhouse;
        Ok(ConnectionConfig {
            host: ch.host.trim().to_string(),
            port: ch.effective_port(),
            username: ch.username.clone(),
            password: ch.password.clone(),
            secure: ch.secure,
            verify: ch.verify,
            connect_timeout: Duration::from_secs(ch.connect_timeout),
            send_receive_timeout: Duration::from_secs(ch.send_receive_timeout),
            database: ch.database.clone(),
        })
    }

    /// Create default configuration
    pub fn default() -> Self {
        Config {
            clickhouse: ClickHouseConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl ClickHouseConfig {
    /// Explicit port, or the ClickHouse HTTP(S) default
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.secure { 8443 } else { 8123 })
    }
}

impl ExecutionConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default()
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        ClickHouseConfig {
            host: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            secure: true,
            verify: true,
            connect_timeout: default_connect_timeout(),
            send_receive_timeout: default_send_receive_timeout(),
            database: None,
        }
    }
}

impl std::fmt::Debug for ClickHouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("secure", &self.secure)
            .field("verify", &self.verify)
            .field("connect_timeout", &self.connect_timeout)
            .field("send_receive_timeout", &self.send_receive_timeout)
            .field("database", &self.database)
            .finish()
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            pool_size: default_pool_size(),
            query_timeout_secs: default_query_timeout_secs(),
            cache_capacity: default_cache_capacity(),
            max_queued: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: default_server_name(),
            instructions: None,
        }
    }
}
