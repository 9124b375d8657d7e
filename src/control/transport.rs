//! # Control-plane transports.
//!
//! Bridges the [`ControlApi`](super::ControlApi) dispatch table to the
//! outside world. Framing is newline-delimited JSON in both directions:
//!
//! ```text
//! → {"tool": "run_simulation", "params": { ... }}
//! ← {"id": "...", "name": "...", "status": "running", ...}
//! ```
//!
//! A malformed request line yields an `invalid_request` error body on its
//! own line; the loop keeps serving. Both transports exit when the provided
//! token is cancelled.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::control::types::ErrorBody;
use crate::error::ControlError;

use super::api::ControlApi;

/// One framed request line.
#[derive(Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    params: Value,
}

async fn answer(api: &ControlApi, line: &str) -> Value {
    match serde_json::from_str::<ToolCall>(line) {
        Ok(call) => api.dispatch(&call.tool, call.params).await,
        Err(e) => {
            let err = ControlError::InvalidRequest(format!("malformed request: {e}"));
            serde_json::to_value(ErrorBody::from(&err)).unwrap_or(Value::Null)
        }
    }
}

async fn serve_lines<R, W>(
    api: Arc<ControlApi>,
    reader: R,
    mut writer: W,
    token: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = answer(&api, &line).await;
        let mut out = response.to_string();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Serves the control API over stdin/stdout until cancelled or EOF.
pub async fn serve_stdio(api: Arc<ControlApi>, token: CancellationToken) -> std::io::Result<()> {
    serve_lines(api, tokio::io::stdin(), tokio::io::stdout(), token).await
}

/// Serves the control API over TCP until cancelled.
///
/// Each connection gets its own line loop over the shared dispatch table.
pub async fn serve_tcp(
    api: Arc<ControlApi>,
    port: u16,
    token: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    loop {
        let (stream, _peer) = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };

        let api = Arc::clone(&api);
        let token = token.child_token();
        tokio::spawn(async move {
            let (read, write) = stream.into_split();
            let _ = serve_lines(api, read, write, token).await;
        });
    }
    Ok(())
}
