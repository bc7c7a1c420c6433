//! LSP header framing over an async byte stream
//!
//! Frames look like `Content-Length: N\r\n\r\n<N bytes of UTF-8 JSON>`.
//! `Content-Type` is accepted but ignored on read and never written.

use lsp_support::Error;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Write one framed JSON message to `writer`.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, body: &Value) -> Result<(), Error> {
    let content = serde_json::to_vec(body)?;
    let header = format!("Content-Length: {}\r\n\r\n", content.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&content).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed JSON message from `reader`.
///
/// Returns `Ok(None)` on a clean EOF encountered before any header bytes
/// (the server closed its stdout between messages). Any other failure —
/// a malformed header, EOF in the middle of a frame, or a non-UTF-8 body
/// — is `Error::Framing`.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<Value>, Error> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Framing(format!("reading header: {e}")))?;

        if n == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(Error::Framing(
                "EOF while reading headers mid-message".into(),
            ));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        let Some((name, value)) = trimmed.split_once(':') else {
            return Err(Error::Framing(format!("malformed header line: {trimmed:?}")));
        };

        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| Error::Framing(format!("bad Content-Length: {e}")))?,
            );
        }
        // Content-Type and any other header is ignored.
    }

    let length = content_length
        .ok_or_else(|| Error::Framing("missing Content-Length header".into()))?;

    let mut body = vec![0u8; length];
    tokio::io::AsyncReadExt::read_exact(reader, &mut body)
        .await
        .map_err(|e| Error::Framing(format!("short read at EOF mid-message: {e}")))?;

    let text = String::from_utf8(body).map_err(|e| Error::Framing(format!("non-UTF-8 body: {e}")))?;
    let value: Value = serde_json::from_str(&text)?;
    Ok(Some(value))
}
