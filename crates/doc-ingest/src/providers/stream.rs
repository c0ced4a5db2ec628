//! Line framing for streamed HTTP responses (NDJSON and server-sent events)
//!
//! Network chunks do not respect line or UTF-8 boundaries, so bytes are
//! buffered until a full line is available.

use async_stream::try_stream;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;

use crate::error::{Error, Result};

/// Split a byte stream into non-empty lines without their terminators
pub fn lines<S, E>(source: S, service: &'static str) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    frame_lines(source, service).boxed()
}

fn frame_lines<S, E>(source: S, service: &'static str) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    try_stream! {
        let mut source = Box::pin(source);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| Error::remote(service, format!("Stream error: {}", e)))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\r', '\n']);
                if !line.trim().is_empty() {
                    yield line.to_string();
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer);
        if !rest.trim().is_empty() {
            yield rest.trim_end_matches('\r').to_string();
        }
    }
}

/// Payload of an SSE `data:` line; `None` for comments and other fields
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Terminator sent by OpenAI-style SSE endpoints
pub const SSE_DONE: &str = "[DONE]";

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn test_lines_across_chunks() {
        let source = chunks(vec![&b"{\"a\":1}\n{\"b\""[..], &b":2}\r\n\n"[..], &b"{\"c\":3}"[..]]);
        let collected: Vec<String> = lines(source, "test")
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]);
    }

    #[tokio::test]
    async fn test_utf8_split_between_chunks() {
        // "é" is 0xC3 0xA9
        let source = chunks(vec![&b"caf\xC3"[..], &b"\xA9\n"[..]]);
        let collected: Vec<String> = lines(source, "test")
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["café"]);
    }

    #[tokio::test]
    async fn test_transport_error_is_remote_error() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"ok\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let items: Vec<Result<String>> = lines(source, "test").collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(Error::RemoteService { .. })));
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some(SSE_DONE));
        assert_eq!(sse_data(": keep-alive"), None);
    }
}
