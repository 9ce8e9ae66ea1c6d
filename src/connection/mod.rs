//! Connection Provider
//!
//! Opens liveness-checked handles to ClickHouse. Handles are not pooled:
//! the executor asks the provider for a fresh [`Connection`] on every
//! uncached execution and drops it when the call ends.
//!
//! [`HttpConnectionProvider`] talks to the ClickHouse HTTP interface. Tests
//! substitute their own provider through the [`ConnectionProvider`] trait.

mod error;
mod http;
mod response;

pub use error::ConnectionError;
pub use http::{HttpConnection, HttpConnectionProvider};
pub use response::decode_json_compact;

use async_trait::async_trait;
use std::time::Duration;

use crate::execution::ExecutionResult;
use crate::result::Table;

/// Immutable, fully validated connection settings.
///
/// Built by [`Config::connection_config`](crate::Config::connection_config).
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub secure: bool,
    pub verify: bool,
    pub connect_timeout: Duration,
    pub send_receive_timeout: Duration,
    pub database: Option<String>,
}

impl ConnectionConfig {
    /// `host:port`, used in logs and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the HTTP interface
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}/", self.host, self.port)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
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

/// Per-request session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    /// Send `readonly=1`: the server refuses any mutating statement
    pub readonly: bool,
    /// Server-side query id, visible in `system.query_log`
    pub query_id: Option<String>,
}

impl QuerySettings {
    /// Read-only settings with a fresh query id.
    pub fn read_only() -> Self {
        QuerySettings {
            readonly: true,
            query_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// An open, authenticated, liveness-checked database handle.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Version string reported during the liveness check
    fn server_version(&self) -> &str;

    /// Run one statement and decode its tabular result.
    async fn query(&self, sql: &str, settings: &QuerySettings) -> ExecutionResult<Table>;
}

/// Source of fresh connections.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secure: bool) -> ConnectionConfig {
        ConnectionConfig {
            host: "ch.internal".to_string(),
            port: if secure { 8443 } else { 8123 },
            username: "reader".to_string(),
            password: "s3cret".to_string(),
            secure,
            verify: true,
            connect_timeout: Duration::from_secs(10),
            send_receive_timeout: Duration::from_secs(20),
            database: None,
        }
    }

    #[test]
    fn test_base_url_scheme() {
        assert_eq!(config(true).base_url(), "https://ch.internal:8443/");
        assert_eq!(config(false).base_url(), "http://ch.internal:8123/");
        assert_eq!(config(false).address(), "ch.internal:8123");
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", config(true));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_read_only_settings() {
        let a = QuerySettings::read_only();
        let b = QuerySettings::read_only();
        assert!(a.readonly);
        assert!(a.query_id.is_some());
        assert_ne!(a.query_id, b.query_id);
    }
}
