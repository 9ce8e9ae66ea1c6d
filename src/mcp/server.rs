//! Line-oriented serve loop
//!
//! Each request is handled on its own task so a slow `run_select_query`
//! does not hold up `ping` or metadata calls. A single writer task owns the
//! output stream; responses are written whole, one per line, in completion
//! order.
//!
//! However the loop ends (end of input, a shutdown signal, a read error),
//! every started request is answered and the query runner is drained before
//! `serve` returns.

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{McpHandler, Response};

/// Serve until `reader` reaches end of input, then drain the query runner.
pub async fn serve<R, W>(handler: Arc<McpHandler>, reader: R, writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_until(handler, reader, writer, std::future::pending()).await
}

/// Serve until end of input, a read error, or `shutdown` resolves.
///
/// A read error is returned after the drain completes.
pub async fn serve_until<R, W, F>(
    handler: Arc<McpHandler>,
    reader: R,
    writer: W,
    shutdown: F,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, io::Error>(())
    });

    info!("mcp_serve_start");
    tokio::pin!(shutdown);
    let mut handlers = JoinSet::new();
    let mut lines = reader.lines();
    let read = loop {
        let next = tokio::select! {
            () = &mut shutdown => {
                info!("mcp_serve_shutdown_requested");
                break Ok(());
            }
            next = lines.next_line() => next,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => {
                warn!(error = %e, "mcp_read_failed");
                break Err(e);
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let handler = Arc::clone(&handler);
        let tx = tx.clone();
        handlers.spawn(async move {
            if let Some(response) = handler.handle_line(&line).await {
                // Writer only goes away if the output stream failed
                let _ = tx.send(response);
            }
        });
        while handlers.try_join_next().is_some() {}
    };

    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "mcp_handler_panicked");
        }
    }
    drop(tx);

    let written = writer_task.await.map_err(io::Error::other).and_then(|w| w);
    handler.service().shutdown().await;
    info!("mcp_serve_stop");
    read.and(written)
}
