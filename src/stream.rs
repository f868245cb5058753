//! Event stream reader.
//!
//! The response body is a sequence of newline-delimited records. Each record is
//! one JSON-encoded [`StreamEvent`], either bare or SSE-framed:
//!
//! ```text
//! {"type":"response.created","response":{"id":"resp_1","output":[]}}
//! data: {"type":"response.output_text.delta","output_index":0,"content_index":0,"delta":"{\"ti"}
//! : keep-alive
//! event: message
//! data: [DONE]
//! ```
//!
//! Lines are reassembled across chunk boundaries before decoding. Blank lines,
//! SSE comments, non-data SSE fields and the `[DONE]` sentinel are skipped. A line
//! that does not decode as a known event is logged and skipped; it never ends
//! the stream. Transport failures and the idle timeout do end it, as an `Err`
//! item after every event already decoded.

use crate::events::StreamEvent;
use crate::{Error, Result};
use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Stream of decoded events for one request.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'a>>;

/// Splits a byte stream into lines.
///
/// `\n` never occurs inside a multi-byte UTF-8 sequence, so splitting on raw
/// bytes and decoding whole lines reassembles characters split across chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.pending);
                if let Some(line) = Self::decode(line) {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// The unterminated last line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        Self::decode(std::mem::take(&mut self.pending))
    }

    fn decode(bytes: Vec<u8>) -> Option<String> {
        match String::from_utf8(bytes) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!(error = %e, "skipping record line that is not valid UTF-8");
                None
            }
        }
    }
}

/// Decode one record line. `None` means the line carries no event.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let payload = if let Some(data) = line.strip_prefix("data:") {
        data.trim_start()
    } else if line.starts_with(':') || is_sse_field(line) {
        tracing::trace!(line, "skipping SSE framing line");
        return None;
    } else {
        line
    };

    if payload == "[DONE]" {
        tracing::trace!("end-of-stream sentinel");
        return None;
    }

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, record = %truncated(payload), "skipping malformed event record");
            None
        }
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

fn truncated(record: &str) -> &str {
    match record.char_indices().nth(120) {
        Some((end, _)) => &record[..end],
        None => record,
    }
}

/// Turn a response body into a stream of events.
///
/// When `idle_timeout` is set and no chunk arrives within it, the stream ends
/// with [`Error::Timeout`].
pub fn read_events<S, B>(body: S, idle_timeout: Option<Duration>) -> EventStream<'static>
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    boxed(try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = LineDecoder::new();

        loop {
            let next = match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, body.next())
                    .await
                    .map_err(|_| Error::timeout())?,
                None => body.next().await,
            };
            let Some(chunk) = next else {
                break;
            };

            for line in decoder.push(chunk?.as_ref()) {
                if let Some(event) = decode_line(&line) {
                    yield event;
                }
            }
        }

        if let Some(line) = decoder.finish() {
            if let Some(event) = decode_line(&line) {
                yield event;
            }
        }
    })
}

pub(crate) fn boxed<'a, S>(stream: S) -> EventStream<'a>
where
    S: Stream<Item = Result<StreamEvent>> + Send + 'a,
{
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const CREATED: &str = r#"{"type":"response.created","response":{"id":"resp_1","status":"in_progress","output":[]}}"#;
    const DELTA: &str = r#"{"type":"response.output_text.delta","output_index":0,"content_index":0,"delta":"Hé"}"#;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<&'static [u8]>> + Send {
        stream::iter(parts.into_iter().map(Ok))
    }

    async fn collect(events: EventStream<'_>) -> Vec<Result<StreamEvent>> {
        events.collect().await
    }

    #[test]
    fn test_line_decoder_reassembles_split_chunks() {
        let mut decoder = LineDecoder::new();
        let text = "première\nligne\n".as_bytes();
        // Split inside the two-byte 'è'.
        let (a, b) = text.split_at(4);

        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec!["première".to_string(), "ligne".to_string()]);
        assert_eq!(decoder.finish(), None);

        decoder.push(b"tail");
        assert_eq!(decoder.finish(), Some("tail".to_string()));
    }

    #[test]
    fn test_decode_line_framing() {
        assert!(decode_line("").is_none());
        assert!(decode_line("   \r").is_none());
        assert!(decode_line(": keep-alive").is_none());
        assert!(decode_line("event: message").is_none());
        assert!(decode_line("id: 7").is_none());
        assert!(decode_line("data: [DONE]").is_none());
        assert!(decode_line("{not json").is_none());
        assert!(decode_line(r#"{"type":"response.mystery"}"#).is_none());

        assert!(matches!(decode_line(CREATED), Some(StreamEvent::Created(_))));
        assert!(matches!(
            decode_line(&format!("data: {}\r", CREATED)),
            Some(StreamEvent::Created(_))
        ));
        assert!(matches!(
            decode_line(&format!("data:{}", DELTA)),
            Some(StreamEvent::OutputTextDelta(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_transparent() {
        let clean = format!("{}\n{}\n", CREATED, DELTA);
        let noisy = format!("{}\n{{\"type\":\"resp\n\n: ping\n{}\ngarbage\n", CREATED, DELTA);

        let from_clean: Vec<StreamEvent> = collect(read_events(
            stream::iter(vec![Ok::<_, Error>(clean.into_bytes())]),
            None,
        ))
        .await
        .into_iter()
        .map(|e| e.unwrap())
        .collect();
        let from_noisy: Vec<StreamEvent> = collect(read_events(
            stream::iter(vec![Ok::<_, Error>(noisy.into_bytes())]),
            None,
        ))
        .await
        .into_iter()
        .map(|e| e.unwrap())
        .collect();

        assert_eq!(from_clean.len(), 2);
        assert_eq!(from_clean, from_noisy);
    }

    #[tokio::test]
    async fn test_records_split_across_chunks() {
        let events = collect(read_events(
            chunks(vec![
                &br#"{"type":"response.cre"#[..],
                &br#"ated","response":{"id":"resp_1","output":[]}}"#[..],
                &b"\n"[..],
                &br#"{"type":"response.output_text.delta","output_index":0,"content_index":0,"delta":"x"}"#[..],
            ]),
            None,
        ))
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(StreamEvent::Created(_))));
        // The last record had no trailing newline.
        assert!(matches!(events[1], Ok(StreamEvent::OutputTextDelta(_))));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream_after_prior_events() {
        let body = stream::iter(vec![
            Ok(format!("{}\n", CREATED).into_bytes()),
            Err(Error::stream("connection reset")),
            Ok(format!("{}\n", DELTA).into_bytes()),
        ]);
        let events = collect(read_events(body, None)).await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(Error::Stream(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let body = stream::iter(vec![Ok::<_, Error>(format!("{}\n", CREATED).into_bytes())])
            .chain(stream::pending());
        let events = collect(read_events(body, Some(Duration::from_secs(5)))).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(Error::Timeout)));
    }
}
