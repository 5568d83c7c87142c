// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-to-close JSON framing over Unix sockets.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

/// Upper bound on a single request or response body.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Errors from socket framing.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("daemon not running at {0}")]
    NotRunning(String),

    #[error("message exceeds {MAX_MESSAGE_BYTES} bytes")]
    TooLarge,

    #[error("connection closed before a message arrived")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// True when the failure means "no daemon is listening".
    pub fn is_not_running(&self) -> bool {
        matches!(self, WireError::NotRunning(_))
    }
}

/// Read one JSON message: consume the stream to EOF and deserialize.
pub async fn read_json<T, R>(reader: &mut R) -> Result<T, WireError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if buf.len() + n > MAX_MESSAGE_BYTES {
            return Err(WireError::TooLarge);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    if buf.is_empty() {
        return Err(WireError::Empty);
    }
    Ok(serde_json::from_slice(&buf)?)
}

/// Write one JSON message and flush. The caller closes or half-closes.
pub async fn write_json<T, W>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// One-shot client request: connect, send, half-close, read the response.
pub async fn request<Req, Resp>(socket_path: &Path, req: &Req) -> Result<Resp, WireError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|_| WireError::NotRunning(socket_path.display().to_string()))?;

    write_json(&mut stream, req).await?;
    // Half-close so the daemon's read-to-EOF completes.
    stream.shutdown().await?;

    read_json(&mut stream).await
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
