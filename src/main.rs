//! MCP ClickHouse Server Binary
//!
//! Speaks MCP over stdin/stdout. Logs go to stderr or a file.
//!
//! Stops at end of input or on SIGINT/SIGTERM. Either way, running queries
//! finish and their replies are written before the process exits.
//!
//! ## Usage
//!
//! ```bash
//! # Read config.toml / config.local.toml and CLICKHOUSE_* variables
//! mcp-clickhouse
//!
//! # Explicit config file and log level
//! mcp-clickhouse --config /etc/mcp-clickhouse.toml --log-level debug
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};

use mcp_clickhouse::logging::init_tracing;
use mcp_clickhouse::{Config, McpHandler, QueryService};

#[derive(Parser)]
#[command(name = "mcp-clickhouse")]
#[command(about = "Read-only ClickHouse tools for MCP clients", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config.toml in the working directory)
    #[arg(long, env = "MCP_CLICKHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides logging.level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy())
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging);

    let service = QueryService::from_config(&config).context("invalid ClickHouse configuration")?;
    info!(
        host = %config.clickhouse.host,
        port = config.clickhouse.effective_port(),
        pool_size = config.execution.pool_size,
        query_timeout_secs = config.execution.query_timeout_secs,
        cache_capacity = config.execution.cache_capacity,
        "Starting MCP ClickHouse server"
    );

    let handler = Arc::new(McpHandler::from_config(service, &config.server));
    mcp_clickhouse::mcp::serve_until(
        handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
    .context("serving MCP over stdio")?;

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
