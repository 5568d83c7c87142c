// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC message framing toward child processes.
//!
//! Two framings exist in the wild:
//! - line-delimited: one JSON object per `\n`-terminated line (tool hub)
//! - LSP: `Content-Length: N\r\n\r\n` followed by exactly N bytes of JSON

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};

/// Ceiling on one framed message from a child.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Message framing used on a child's stdin/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    LineDelimited,
    Lsp,
}

impl Framing {
    /// Encode one message for the child's stdin.
    pub fn encode(&self, message: &Value) -> Vec<u8> {
        let body = message.to_string();
        match self {
            Framing::LineDelimited => {
                let mut bytes = body.into_bytes();
                bytes.push(b'\n');
                bytes
            }
            Framing::Lsp => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                let mut bytes = header.into_bytes();
                bytes.extend_from_slice(body.as_bytes());
                bytes
            }
        }
    }

    /// Read one message from the child's stdout.
    ///
    /// `Ok(None)` means the stream ended cleanly; a malformed frame is an
    /// error (the child is speaking the wrong protocol).
    pub async fn read_message<R>(&self, reader: &mut R) -> std::io::Result<Option<Value>>
    where
        R: AsyncBufReadExt + Unpin,
    {
        match self {
            Framing::LineDelimited => loop {
                let mut line = String::new();
                let n = reader.read_line(&mut line).await?;
                if n == 0 {
                    return Ok(None);
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                return serde_json::from_str(trimmed)
                    .map(Some)
                    .map_err(|e| bad_frame(format!("invalid JSON line: {e}")));
            },
            Framing::Lsp => {
                // Headers first; only Content-Length matters.
                let mut content_length: Option<usize> = None;
                loop {
                    let mut line = String::new();
                    let n = reader.read_line(&mut line).await?;
                    if n == 0 {
                        // EOF between messages is a clean end; EOF mid-header
                        // with a length already parsed is truncation.
                        return if content_length.is_none() {
                            Ok(None)
                        } else {
                            Err(bad_frame("stream ended inside LSP headers".to_string()))
                        };
                    }
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:")
                    {
                        content_length = Some(
                            value
                                .trim()
                                .parse()
                                .map_err(|_| bad_frame(format!("bad Content-Length: {line}")))?,
                        );
                    }
                }

                let len = content_length
                    .ok_or_else(|| bad_frame("missing Content-Length header".to_string()))?;
                if len > MAX_FRAME_BYTES {
                    return Err(bad_frame(format!("frame of {len} bytes exceeds limit")));
                }

                let mut body = vec![0u8; len];
                reader.read_exact(&mut body).await?;
                serde_json::from_slice(&body)
                    .map(Some)
                    .map_err(|e| bad_frame(format!("invalid JSON body: {e}")))
            }
        }
    }
}

fn bad_frame(reason: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, reason)
}

/// Build a JSON-RPC request.
pub fn rpc_request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut message = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

/// Build a JSON-RPC notification (no id, no response).
pub fn rpc_notification(method: &str, params: Option<Value>) -> Value {
    let mut message = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
