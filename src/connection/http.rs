//! ClickHouse HTTP interface client.
//!
//! Every statement is POSTed as the request body with `default_format` set
//! to `JSONCompact`. Credentials travel in `X-ClickHouse-User` /
//! `X-ClickHouse-Key` headers so they never appear in URLs or logs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{error, info};

use super::response::decode_json_compact;
use super::{Connection, ConnectionConfig, ConnectionError, ConnectionProvider, QuerySettings};
use crate::execution::{ExecutionError, ExecutionResult};
use crate::result::Table;

const LIVENESS_QUERY: &str = "SELECT version()";

// ClickHouse exception codes that mean "bad credentials"
const AUTHENTICATION_FAILED: u32 = 516;
const REQUIRED_PASSWORD: u32 = 194;
const UNKNOWN_USER: u32 = 192;

/// Opens a new [`HttpConnection`] per call.
#[derive(Debug, Clone)]
pub struct HttpConnectionProvider {
    config: ConnectionConfig,
}

impl HttpConnectionProvider {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionProvider for HttpConnectionProvider {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let cfg = &self.config;
        info!(
            host = %cfg.host,
            port = cfg.port,
            user = %cfg.username,
            secure = cfg.secure,
            verify = cfg.verify,
            connect_timeout_secs = cfg.connect_timeout.as_secs(),
            send_receive_timeout_secs = cfg.send_receive_timeout.as_secs(),
            "Creating ClickHouse client connection"
        );

        match HttpConnection::open(cfg).await {
            Ok(conn) => {
                info!(version = %conn.server_version(), "Connected to ClickHouse server");
                Ok(Box::new(conn))
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to ClickHouse");
                Err(e)
            }
        }
    }
}

/// A liveness-checked HTTP session against one server.
pub struct HttpConnection {
    client: Client,
    endpoint: Url,
    username: String,
    password: String,
    database: Option<String>,
    version: String,
}

impl HttpConnection {
    /// Build the client and run the liveness check.
    pub async fn open(cfg: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let address = cfg.address();
        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.send_receive_timeout)
            .gzip(true)
            .danger_accept_invalid_certs(!cfg.verify)
            .build()
            .map_err(|source| ConnectionError::Client {
                address: address.clone(),
                source,
            })?;
        let endpoint = Url::parse(&cfg.base_url()).map_err(|e| ConnectionError::Handshake {
            address: address.clone(),
            message: format!("invalid server URL: {e}"),
        })?;

        let mut conn = HttpConnection {
            client,
            endpoint,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            database: cfg.database.clone(),
            version: String::new(),
        };

        let version = conn.handshake(cfg).await?;
        conn.version = version;
        Ok(conn)
    }

    async fn handshake(&self, cfg: &ConnectionConfig) -> Result<String, ConnectionError> {
        let address = cfg.address();
        let response = self
            .request(LIVENESS_QUERY, &QuerySettings::read_only())
            .send()
            .await
            .map_err(|source| ConnectionError::Transport {
                address: address.clone(),
                source,
            })?;

        let status = response.status();
        let code = exception_code(&response);
        let body = response
            .text()
            .await
            .map_err(|source| ConnectionError::Transport {
                address: address.clone(),
                source,
            })?;

        if !status.is_success() {
            let message = body.trim().to_string();
            let auth_failure = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
                || matches!(
                    code,
                    Some(AUTHENTICATION_FAILED | REQUIRED_PASSWORD | UNKNOWN_USER)
                );
            return Err(if auth_failure {
                ConnectionError::Authentication {
                    address,
                    user: cfg.username.clone(),
                    message,
                }
            } else {
                ConnectionError::Handshake { address, message }
            });
        }

        let table = decode_json_compact(&body).map_err(|e| ConnectionError::Handshake {
            address: address.clone(),
            message: e.to_string(),
        })?;
        match table.first_cell().and_then(|c| c.as_str()) {
            Some(version) if !version.is_empty() => Ok(version.to_string()),
            _ => Err(ConnectionError::Handshake {
                address,
                message: "server did not report a version".to_string(),
            }),
        }
    }

    fn request(&self, sql: &str, settings: &QuerySettings) -> reqwest::RequestBuilder {
        let mut url = self.endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("default_format", "JSONCompact");
            if settings.readonly {
                params.append_pair("readonly", "1");
            }
            if let Some(id) = &settings.query_id {
                params.append_pair("query_id", id);
            }
        }

        let mut builder = self
            .client
            .post(url)
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql.to_string());
        if let Some(db) = &self.database {
            builder = builder.header("X-ClickHouse-Database", db);
        }
        builder
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn server_version(&self) -> &str {
        &self.version
    }

    async fn query(&self, sql: &str, settings: &QuerySettings) -> ExecutionResult<Table> {
        let response = self
            .request(sql, settings)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        let status = response.status();
        let code = exception_code(&response);
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ExecutionError::Server {
                status: status.as_u16(),
                code,
                message: body.trim().to_string(),
            });
        }
        decode_json_compact(&body)
    }
}

fn exception_code(response: &reqwest::Response) -> Option<u32> {
    response
        .headers()
        .get("X-ClickHouse-Exception-Code")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
