//! Content-Length framed message transport
//!
//! Backends speak the LSP base protocol on their pipes: each JSON body is
//! preceded by a `Content-Length: <n>\r\n\r\n` header block.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::client::protocol::JsonRpcMessage;
use crate::error::{Result, SemaLspError};

/// Upper bound on a single framed body
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Write one framed message and flush
pub async fn write_message<W, M>(writer: &mut W, message: &M) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| SemaLspError::Protocol(format!("failed to encode message: {e}")))?;

    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message; `Ok(None)` on clean end-of-stream
pub async fn read_message<R>(reader: &mut R) -> Result<Option<JsonRpcMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return if content_length.is_none() {
                Ok(None)
            } else {
                Err(SemaLspError::Protocol(
                    "stream ended mid-header".to_string(),
                ))
            };
        }

        let line = line.trim_end();
        if line.is_empty() {
            break;
        }

        if let Some(value) = line
            .strip_prefix("Content-Length:")
            .or_else(|| line.strip_prefix("content-length:"))
        {
            let length = value.trim().parse::<usize>().map_err(|_| {
                SemaLspError::Protocol(format!("bad Content-Length header: '{line}'"))
            })?;
            if length > MAX_BODY_BYTES {
                return Err(SemaLspError::Protocol(format!(
                    "message body of {length} bytes exceeds the {MAX_BODY_BYTES} byte limit"
                )));
            }
            content_length = Some(length);
        }
        // Other headers (Content-Type) are tolerated and ignored.
    }

    let length = content_length
        .ok_or_else(|| SemaLspError::Protocol("header block without Content-Length".to_string()))?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| SemaLspError::Protocol(format!("failed to decode message body: {e}")))
}
