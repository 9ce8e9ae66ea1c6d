//! # MCP ClickHouse
//!
//! A read-only ClickHouse gateway for tool-calling agents. Agents send SQL
//! text; the gateway runs it under a bounded worker pool with a deadline,
//! memoizes every outcome by exact query text and answers over MCP.
//!
//! ## Request Flow
//! ```text
//! MCP request (stdio, JSON-RPC)
//!     ↓
//! [tools]              → metadata templates / ad-hoc SELECT
//!     ↓
//! [BoundedRunner]      → pool of N permits, per-call deadline
//!     ↓
//! [MemoizedExecutor]   → LRU hit, or single execution per text
//!     ↓
//! [ConnectionProvider] → fresh HTTP session, readonly=1
//!     ↓
//! ClickHouse
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use mcp_clickhouse::{Config, QueryService};
//!
//! let config = Config::load()?;
//! let service = QueryService::from_config(&config)?;
//!
//! let result = service.run("SELECT name FROM system.databases").await?;
//! println!("{}", result.to_display_text());
//!
//! service.shutdown().await;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Layered configuration (TOML + environment) |
//! | `connection` | Connection provider and the ClickHouse HTTP client |
//! | `execution` | Memoized executor, bounded runner, schema prober |
//! | `result` | Tabular results and failure values |
//! | `render` | Markdown rendering of tables |
//! | `service` | Process-scoped handle tying execution together |
//! | `tools` | Agent-facing metadata and query tools |
//! | `mcp` | JSON-RPC over stdio |

pub mod config;
pub mod connection;
pub mod execution;
pub mod logging;
pub mod mcp;
pub mod render;
pub mod result;
pub mod service;
pub mod tools;

pub use config::{Config, ConfigError};
pub use connection::{
    Connection, ConnectionConfig, ConnectionError, ConnectionProvider, HttpConnectionProvider,
    QuerySettings,
};
pub use execution::{
    wrap_query, BoundedRunner, CacheStats, ExecutionError, ExecutionResult, MemoizedExecutor,
    ProbeError, QueryCache, SchemaProber, DEFAULT_CACHE_CAPACITY, DEFAULT_POOL_SIZE,
    DEFAULT_QUERY_TIMEOUT,
};
pub use mcp::McpHandler;
pub use result::{Cell, Column, QueryFailure, QueryResult, Table};
pub use service::QueryService;
pub use tools::{Tool, ToolCall, ToolError, ToolOutput};
