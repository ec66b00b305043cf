use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use lendflow_types::{ChatEvent, ChatRequest, StreamQuery, DEFAULT_SESSION_ID};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Incremental `text/event-stream` decoder
///
/// Bytes go in as they come off the wire; only complete lines are parsed,
/// so a frame split across reads is held until its newline arrives.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: VecDeque<u8>,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(4096),
        }
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk, returning every event it completed
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatEvent> {
        self.buffer.extend(bytes);

        let mut events = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// End of stream: an unterminated trailing fragment is dropped
    pub fn finish(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let fragment: Vec<u8> = self.buffer.drain(..).collect();
        tracing::warn!(
            bytes = fragment.len(),
            fragment = %String::from_utf8_lossy(&fragment),
            "Dropping incomplete SSE frame at end of stream"
        );
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();

            match String::from_utf8(line_bytes) {
                Ok(line) => return Some(line.trim_end_matches(['\n', '\r']).to_string()),
                Err(e) => tracing::warn!("Skipping SSE line with invalid UTF-8: {}", e),
            }
        }
    }
}

fn parse_line(line: &str) -> Option<ChatEvent> {
    // Blank separators, `:` keep-alives and non-data fields carry nothing
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatEvent>(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(data, "Dropping malformed SSE frame: {}", e);
            None
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// One `GET /chat/stream` request per submitted message
#[derive(Debug, Clone)]
pub struct SseTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl SseTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Stream the events of one turn
    ///
    /// Cancelling `cancel` ends the stream at the next suspension point and
    /// drops the HTTP response, releasing the connection.
    pub fn stream_turn(&self, request: &ChatRequest, cancel: CancellationToken) -> EventStream {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
        let query = StreamQuery::from_request(session_id, request);
        let http_client = self.http_client.clone();
        let url = format!("{}/chat/stream", self.base_url);

        Box::pin(async_stream::stream! {
            let send = http_client
                .get(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .query(&query)
                .send();

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("SSE turn cancelled before response");
                    return;
                }
                response = send => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    yield Err(ClientError::Http(e));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                yield Err(ClientError::Status { status, body });
                return;
            }

            let mut byte_chunks = Box::pin(response.bytes_stream());
            let mut decoder = SseFrameDecoder::new();

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("SSE turn cancelled mid-stream");
                        return;
                    }
                    chunk = byte_chunks.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.push(&bytes) {
                            if cancel.is_cancelled() {
                                tracing::debug!("SSE turn cancelled mid-chunk");
                                return;
                            }
                            yield Ok(event);
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(ClientError::Http(e));
                        return;
                    }
                    None => break,
                }
            }

            decoder.finish();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseFrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"con").is_empty());
        assert!(decoder.push(b"tent\",\"data\":\"Hi\"}").is_empty());

        let events = decoder.push(b"\n\n");
        assert_eq!(events, vec![ChatEvent::content("Hi")]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = SseFrameDecoder::new();
        let events = decoder.push(
            b"data: {\"type\":\"ack\"}\n\n\
              data:{\"type\":\"content_start\"}\r\n\r\n\
              data: {\"type\":\"done\"}\n\n",
        );
        let kinds: Vec<_> = events.iter().map(ChatEvent::kind).collect();
        assert_eq!(kinds, vec!["ack", "content_start", "done"]);
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut decoder = SseFrameDecoder::new();
        let events = decoder.push(b"data: {not json}\n\ndata: {\"type\":\"done\"}\n\n");
        assert_eq!(events, vec![ChatEvent::Done { message_id: None }]);
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let mut decoder = SseFrameDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 7\nretry: 100\ndata:\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let frame = "data: {\"type\":\"content\",\"data\":\"₹12,000\"}\n".as_bytes();
        let split = frame.iter().position(|&b| b == 0xE2).unwrap() + 1;

        let mut decoder = SseFrameDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        assert_eq!(decoder.push(&frame[split..]), vec![ChatEvent::content("₹12,000")]);
    }

    #[test]
    fn test_trailing_fragment_dropped_on_finish() {
        let mut decoder = SseFrameDecoder::new();
        decoder.push(b"data: {\"type\":\"done\"}\n\ndata: {\"type\":\"cont");
        assert!(decoder.pending() > 0);
        decoder.finish();
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_unknown_event_type_passes_through() {
        let mut decoder = SseFrameDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"typing\"}\n");
        assert_eq!(events, vec![ChatEvent::Unknown]);
    }
}
