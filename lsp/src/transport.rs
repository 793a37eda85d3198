//! Base-protocol framing over a child's stdio.
//!
//! A frame is a header block terminated by a blank line, followed by exactly
//! `Content-Length` bytes of UTF-8 JSON. Only `Content-Length` is emitted on
//! writes; other headers are accepted and ignored on reads.

use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::LspErr;
use crate::error::Result;

/// Frames larger than this are discarded rather than buffered.
const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Read one frame and return its payload bytes.
///
/// A header block without a usable `Content-Length` (missing, unparsable, or
/// a value of zero or less) yields an empty payload so the caller can keep
/// reading. Clean end-of-file is [`LspErr::Eof`].
pub async fn read_frame(reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> Result<Vec<u8>> {
    let mut content_length: i64 = -1;
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Err(LspErr::Eof);
        }
        let header = line.trim();
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            match value.trim().parse::<i64>() {
                Ok(n) => content_length = n,
                Err(err) => warn!(header, %err, "unparsable Content-Length"),
            }
        }
    }

    if content_length <= 0 {
        return Ok(Vec::new());
    }
    let content_length = content_length as usize;
    if content_length > MAX_CONTENT_LENGTH {
        warn!(content_length, "oversized frame, discarding payload");
        discard(reader, content_length).await?;
        return Ok(Vec::new());
    }

    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

async fn discard(reader: &mut (dyn AsyncBufRead + Send + Unpin), mut remaining: usize) -> Result<()> {
    let mut chunk = [0u8; 8192];
    while remaining > 0 {
        let take = remaining.min(chunk.len());
        reader.read_exact(&mut chunk[..take]).await?;
        remaining -= take;
    }
    Ok(())
}

/// Write one frame: the serialized JSON followed by CR LF, preceded by a
/// `Content-Length` header counting both. The whole frame goes out in a
/// single write so concurrent writers (serialized by the session write-lock)
/// never interleave.
pub async fn write_frame(writer: &mut (dyn AsyncWrite + Send + Unpin), json: &[u8]) -> Result<()> {
    let header = format!("Content-Length: {}\r\n\r\n", json.len() + 2);
    let mut frame = Vec::with_capacity(header.len() + json.len() + 2);
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(json);
    frame.extend_from_slice(b"\r\n");
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::BufReader;
    use tokio::io::duplex;

    #[tokio::test]
    async fn framing_roundtrip() {
        let (mut tx, rx) = duplex(1024);
        let mut reader = BufReader::new(rx);

        let json = br#"{"jsonrpc":"2.0","id":1}"#;
        write_frame(&mut tx, json).await.unwrap();

        let payload = read_frame(&mut reader).await.unwrap();
        let mut expected = json.to_vec();
        expected.extend_from_slice(b"\r\n");
        assert_eq!(payload, expected);
    }

    #[tokio::test]
    async fn header_counts_payload_bytes() {
        let json = br#"{"k":1}"#;
        let (mut tx, rx) = duplex(256);
        write_frame(&mut tx, json).await.unwrap();
        drop(tx);

        let mut reader = BufReader::new(rx);
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.starts_with(&format!("Content-Length: {}\r\n\r\n", json.len() + 2)));
        assert!(raw.ends_with("\r\n"));
    }

    #[tokio::test]
    async fn missing_content_length_yields_empty_payload() {
        let input: &[u8] = b"Content-Type: application/vscode-jsonrpc\r\n\r\n";
        let mut reader = BufReader::new(input);
        let payload = read_frame(&mut reader).await.unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn unknown_headers_are_ignored() {
        let body = r#"{"jsonrpc":"2.0","id":2}"#;
        let input = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
            body.len(),
        );
        let mut reader = BufReader::new(input.as_bytes());
        let payload = read_frame(&mut reader).await.unwrap();
        assert_eq!(payload, body.as_bytes());
    }

    #[tokio::test]
    async fn content_length_is_case_insensitive() {
        let body = r#"{"id":3}"#;
        let input = format!("content-length: {}\r\n\r\n{body}", body.len());
        let mut reader = BufReader::new(input.as_bytes());
        let payload = read_frame(&mut reader).await.unwrap();
        assert_eq!(payload, body.as_bytes());
    }

    #[tokio::test]
    async fn eof_is_terminal() {
        let input: &[u8] = b"";
        let mut reader = BufReader::new(input);
        assert!(matches!(read_frame(&mut reader).await, Err(LspErr::Eof)));
    }

    #[tokio::test]
    async fn multiple_frames_in_sequence() {
        let (mut tx, rx) = duplex(1024);
        write_frame(&mut tx, br#"{"id":1}"#).await.unwrap();
        write_frame(&mut tx, br#"{"id":2}"#).await.unwrap();

        let mut reader = BufReader::new(rx);
        let first = read_frame(&mut reader).await.unwrap();
        let second = read_frame(&mut reader).await.unwrap();
        assert!(first.starts_with(br#"{"id":1}"#));
        assert!(second.starts_with(br#"{"id":2}"#));
    }
}
