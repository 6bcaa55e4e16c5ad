//! Newline-delimited JSON-RPC over a byte stream pair (stdin/stdout).
//!
//! One message is read, handled and written before the next line is read.
//! Every write is a complete JSON document followed by `\n` and a flush.

use async_trait::async_trait;
use mcp_tunnel_types::jsonrpc::{JsonRpcResponse, SERVER_ERROR};
use serde_json::Value;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Produces exactly one reply for every inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Value) -> Value;
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Input stream closed.
    Eof,
    /// Shutdown signal received.
    Interrupted,
    /// Reading input failed; a final error message was written.
    Fatal,
}

/// Run the stdio loop until EOF, `shutdown` resolves, or input fails.
///
/// Errors are returned only when the output stream itself cannot be written.
pub async fn run<H, R, W, S>(
    handler: &H,
    reader: R,
    mut writer: W,
    shutdown: S,
) -> std::io::Result<LoopExit>
where
    H: MessageHandler + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                return Ok(LoopExit::Interrupted);
            }
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Input closed");
                return Ok(LoopExit::Eof);
            }
            Err(e) => {
                error!("Failed to read input: {}", e);
                let response = JsonRpcResponse::error(
                    Value::Null,
                    SERVER_ERROR,
                    format!("Proxy error: {}", e),
                );
                write_message(&mut writer, &response.into_value()).await?;
                return Ok(LoopExit::Fatal);
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Value>(line) {
            Ok(message) => {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Interrupted while a request was in flight, shutting down");
                        return Ok(LoopExit::Interrupted);
                    }
                    reply = handler.handle(message) => reply,
                }
            }
            Err(e) => {
                warn!("Discarding malformed input line: {}", e);
                JsonRpcResponse::parse_error().into_value()
            }
        };

        write_message(&mut writer, &reply).await?;
    }
}

/// Write one message as a single line and flush.
async fn write_message<W>(writer: &mut W, message: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}
