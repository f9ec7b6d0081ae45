//! Incremental decoding of server-sent completion streams.
//!
//! The body is a sequence of frames separated by blank lines. Each frame's
//! `data:` lines carry either a JSON chunk or the `[DONE]` sentinel.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use memchr::memmem;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::chat_stream::extract_error_summary;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

const FRAME_SEPARATOR: &[u8] = b"\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Delta(String),
    Done,
}

/// A frame whose payload was not valid JSON.
#[derive(Debug, Clone)]
pub struct MalformedFrame {
    pub payload: String,
    pub reason: String,
}

impl fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed stream frame ({}): {}", self.reason, self.payload)
    }
}

impl std::error::Error for MalformedFrame {}

/// Accumulates body bytes and hands back complete frames.
#[derive(Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    /// Bytes before this offset are known not to start a separator.
    scanned: usize,
}

impl FrameBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // CRLF framing is folded into LF so one separator search covers both.
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut frames = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(relative) = memmem::find(&self.buffer[from..], FRAME_SEPARATOR) {
            let end = from + relative;
            let frame = String::from_utf8_lossy(&self.buffer[start..end]);
            if !frame.trim().is_empty() {
                frames.push(frame.into_owned());
            }
            start = end + FRAME_SEPARATOR.len();
            from = start;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }
        // the last byte may still be the first half of a separator
        let tail = FRAME_SEPARATOR.len() - 1;
        self.scanned = self.buffer.len().saturating_sub(tail);
        frames
    }

    /// Flush whatever is left once the body has closed.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.scanned = 0;
        if rest.trim().is_empty() {
            Vec::new()
        } else {
            vec![rest]
        }
    }
}

fn frame_payload(frame: &str) -> String {
    frame
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect()
}

/// Pull the text delta out of a decoded chunk.
///
/// Chat-style chunks carry it in `choices[0].delta.content`, legacy
/// completion chunks in `choices[0].text`, and simple relays at the top
/// level as `text`.
pub fn extract_delta(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/choices/0/text").and_then(Value::as_str))
        .or_else(|| value.get("text").and_then(Value::as_str))
}

/// Decode one frame. `Ok(None)` means the frame carried nothing to show.
pub fn parse_frame(frame: &str) -> Result<Option<StreamFrame>, MalformedFrame> {
    let payload = frame_payload(frame);
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == DONE_SENTINEL {
        return Ok(Some(StreamFrame::Done));
    }

    let value: Value = serde_json::from_str(payload).map_err(|err| MalformedFrame {
        payload: payload.to_string(),
        reason: err.to_string(),
    })?;

    if value.get("error").is_some() {
        let summary = extract_error_summary(&value).unwrap_or_default();
        warn!(summary = %summary, "Error object received inside completion stream");
        return Ok(None);
    }

    Ok(extract_delta(&value)
        .filter(|text| !text.is_empty())
        .map(|text| StreamFrame::Delta(text.to_string())))
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    frames: FrameBuffer,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, frames: Vec<String>) {
        for frame in frames {
            if self.finished {
                break;
            }
            match parse_frame(&frame) {
                Ok(Some(StreamFrame::Delta(text))) => self.pending.push_back(text),
                Ok(Some(StreamFrame::Done)) => {
                    debug!("Completion stream reached sentinel");
                    self.finished = true;
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Skipping malformed stream frame"),
            }
        }
    }
}

/// Turn a response body into a lazy sequence of text deltas.
///
/// The sequence ends at the `[DONE]` sentinel, when the body closes, or
/// when the body reports a transport error. Dropping it early drops the
/// body with it.
pub fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let state = DecodeState {
        body: Box::pin(body),
        frames: FrameBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((delta, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.frames.push(chunk.as_ref());
                    state.absorb(frames);
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Completion stream interrupted");
                    let frames = state.frames.finish();
                    state.absorb(frames);
                    state.finished = true;
                }
                None => {
                    let frames = state.frames.finish();
                    state.absorb(frames);
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        stream::iter(parts.to_vec().into_iter().map(Ok))
    }

    async fn collect(parts: &[&'static [u8]]) -> Vec<String> {
        decode_stream(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn decodes_text_frames_until_sentinel() {
        let body: &[u8] =
            b"data: {\"text\":\"Hello\"}\n\ndata: {\"text\":\" world\"}\n\ndata: [DONE]\n\n";
        assert_eq!(collect(&[body]).await, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn sentinel_stops_even_with_bytes_buffered() {
        let body: &[u8] = b"data: {\"text\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"text\":\"b\"}\n\n";
        let more: &[u8] = b"data: {\"text\":\"c\"}\n\n";
        assert_eq!(collect(&[body, more]).await, vec!["a"]);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let body: &[u8] =
            b"data: {\"text\":\"one\"}\n\ndata: {not json\n\ndata: {\"text\":\"two\"}\n\ndata: [DONE]\n\n";
        assert_eq!(collect(&[body]).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn frames_split_across_chunks_and_codepoints() {
        // "é" is 0xC3 0xA9; split it between chunks
        let parts: [&'static [u8]; 4] = [
            b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xC3",
            b"\xA9\"}}]}\n",
            b"\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\r\n",
            b"data: [DONE]\n\n",
        ];
        assert_eq!(collect(&parts).await, vec!["café"]);
    }

    #[tokio::test]
    async fn close_without_sentinel_is_a_normal_end() {
        let parts: [&'static [u8]; 2] = [
            b"data: {\"choices\":[{\"text\":\"partial\"}]}\n\n",
            b"data: {\"text\":\"tail\"}",
        ];
        assert_eq!(collect(&parts).await, vec!["partial", "tail"]);
    }

    #[tokio::test]
    async fn transport_error_ends_the_sequence() {
        let parts = vec![
            Ok::<&'static [u8], String>(&b"data: {\"text\":\"kept\"}\n\n"[..]),
            Err("connection reset".to_string()),
            Ok(&b"data: {\"text\":\"lost\"}\n\n"[..]),
        ];
        let deltas: Vec<String> = decode_stream(stream::iter(parts)).collect().await;
        assert_eq!(deltas, vec!["kept"]);
    }

    #[tokio::test]
    async fn consumer_can_stop_early() {
        let body: &[u8] = b"data: {\"text\":\"1\"}\n\ndata: {\"text\":\"2\"}\n\n";
        let deltas = decode_stream(chunks(&[body]));
        let first: Vec<String> = deltas.take(1).collect().await;
        assert_eq!(first, vec!["1"]);
    }

    #[test]
    fn parse_frame_variants() {
        assert_eq!(parse_frame("data: [DONE]").unwrap(), Some(StreamFrame::Done));
        assert_eq!(parse_frame("data:[DONE]").unwrap(), Some(StreamFrame::Done));
        assert_eq!(parse_frame(": keep-alive").unwrap(), None);
        assert_eq!(
            parse_frame("event: message\ndata: {\"text\":\"x\"}").unwrap(),
            Some(StreamFrame::Delta("x".into()))
        );
        assert_eq!(
            parse_frame("data: {\"error\":{\"message\":\"overloaded\"}}").unwrap(),
            None
        );
        assert!(parse_frame("data: nope").is_err());
    }

    #[test]
    fn multi_line_data_is_joined() {
        let frame = "data: {\"text\":\ndata: \"joined\"}";
        assert_eq!(
            parse_frame(frame).unwrap(),
            Some(StreamFrame::Delta("joined".into()))
        );
    }

    #[test]
    fn long_frame_in_small_pieces_is_scanned_once() {
        let payload = format!("data: {{\"text\":\"{}\"}}", "x".repeat(4096));
        let mut buffer = FrameBuffer::default();
        for byte in payload.as_bytes() {
            assert!(buffer.push(std::slice::from_ref(byte)).is_empty());
            assert_eq!(buffer.scanned, buffer.buffer.len() - 1);
        }

        // a separator split across pushes is still found
        assert!(buffer.push(b"\n").is_empty());
        assert_eq!(buffer.push(b"\ndata: [DONE]"), vec![payload]);
        assert_eq!(buffer.scanned, "data: [DONE]".len() - 1);
        assert_eq!(buffer.finish(), vec!["data: [DONE]".to_string()]);
        assert_eq!(buffer.scanned, 0);
    }
}
