//! Line-delimited JSON-RPC over stdin/stdout
//!
//! Stdout carries protocol messages only; logs go to stderr. Each line is
//! handled on its own task so a slow chart download does not hold up later
//! requests; replies are written as they complete, one per line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::server::McpServer;
use crate::{Error, Result};

/// Replies waiting for the writer.
const OUTBOX_CAPACITY: usize = 64;

/// Serve on the process's stdin/stdout until stdin closes.
pub async fn run(server: McpServer) -> Result<()> {
    tracing::info!("MCP server ready, listening on stdio");
    serve(server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serve one message per line from `input`, writing replies to `output`.
///
/// Returns once `input` is exhausted and every request read from it has
/// been answered.
pub async fn serve<R, W>(server: McpServer, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (outbox, mut replies) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    let read = async move {
        let mut lines = input.lines();
        let mut in_flight = JoinSet::new();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let server = server.clone();
            let outbox = outbox.clone();
            let message = line.to_string();
            in_flight.spawn(async move {
                if let Some(reply) = server.handle_message(&message).await {
                    let _ = outbox.send(reply).await;
                }
            });
        }
        drop(outbox);

        tracing::info!(in_flight = in_flight.len(), "stdin closed, finishing requests");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Request task failed");
            }
        }
        Ok::<(), Error>(())
    };

    let write = async {
        while let Some(reply) = replies.recv().await {
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<(), Error>(())
    };

    tokio::try_join!(read, write)?;
    tracing::info!("stdio session ended");
    Ok(())
}
