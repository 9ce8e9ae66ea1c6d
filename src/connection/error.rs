//! Connection Error Types

use thiserror::Error;

/// Failure to obtain a usable connection.
///
/// Surfaced to the caller and never cached or retried at this layer.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The HTTP client could not be constructed (bad TLS setup, ...)
    #[error("Failed to build client for {address}: {source}")]
    Client {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server could not be reached
    #[error("Connection to {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    /// Credentials were rejected
    #[error("Authentication as '{user}' on {address} failed: {message}")]
    Authentication {
        address: String,
        user: String,
        message: String,
    },

    /// The liveness check did not succeed
    #[error("Handshake with {address} failed: {message}")]
    Handshake { address: String, message: String },
}

impl ConnectionError {
    /// Address of the server the error refers to
    pub fn address(&self) -> &str {
        match self {
            ConnectionError::Client { address, .. }
            | ConnectionError::Transport { address, .. }
            | ConnectionError::Authentication { address, .. }
            | ConnectionError::Handshake { address, .. } => address,
        }
    }
}
