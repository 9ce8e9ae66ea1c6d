//! Query Execution Module
//!
//! Memoized, bounded query execution:
//! - Memoization of results (including failures) in a bounded LRU
//! - Single-flight coalescing of concurrent identical queries
//! - A bounded worker pool with per-call deadlines
//! - Cooperative cancellation of work that has not started yet
//! - Schema probing through the same memoized path

mod cache;
mod executor;
mod probe;
mod runner;
mod timeout;

pub use cache::{CacheStats, QueryCache, DEFAULT_CACHE_CAPACITY};
pub use executor::{wrap_query, MemoizedExecutor, QUERY_FOOTER, QUERY_HEADER};
pub use probe::{ProbeError, SchemaProber};
pub use runner::{BoundedRunner, DEFAULT_POOL_SIZE, DEFAULT_QUERY_TIMEOUT};

/// Execution error types
///
/// Raised by a [`Connection`](crate::connection::Connection) when the server
/// rejects or fails a query. The executor folds these into
/// [`QueryFailure::Execution`](crate::QueryFailure::Execution).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// The server answered with an exception
    #[error("{message}")]
    Server {
        /// HTTP status of the response
        status: u16,
        /// ClickHouse exception code, when reported
        code: Option<u32>,
        message: String,
    },

    /// The request did not complete (reset, read timeout, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ExecutionError {
    /// ClickHouse exception code, if the server reported one
    pub fn code(&self) -> Option<u32> {
        match self {
            ExecutionError::Server { code, .. } => *code,
            _ => None,
        }
    }
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;
