//! Incremental server-sent-event decoder.
//!
//! Bytes are buffered until a full line is available and lines are buffered
//! until a blank line closes the frame, so the emitted events do not depend
//! on where the transport happened to cut the byte stream.

use bytes::{Buf, BytesMut};

use super::SessionEvent;
use super::frame::parse_payload;
use crate::error::StreamError;

/// Message used for the implicit error when the transport ends early.
pub const CLOSED_EARLY: &str = "Assistant stream closed before the turn completed";

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: BytesMut,
    data_lines: Vec<String>,
    terminated: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a raw chunk. Ignored once the sequence has terminated.
    pub fn feed(&mut self, chunk: &[u8]) {
        if !self.terminated {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// True after `TurnEnd`, a protocol error, or [`Self::finish`].
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Next fully delineated event from the buffered bytes, if any.
    pub fn next_event(&mut self) -> Option<Result<SessionEvent, StreamError>> {
        while !self.terminated {
            let line = match self.take_line()? {
                Ok(line) => line,
                Err(e) => return Some(self.fail(e)),
            };

            if line.is_empty() {
                if let Some(result) = self.dispatch() {
                    return Some(result);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            if field == "data" {
                self.data_lines.push(value.to_string());
            } else {
                tracing::trace!("Ignoring stream field '{}'", field);
            }
        }
        None
    }

    /// Signal that the transport has closed.
    ///
    /// Returns the implicit `TurnError` when the stream ended without a
    /// `TurnEnd`; a half-received frame is discarded.
    pub fn finish(&mut self) -> Option<SessionEvent> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        if !self.buffer.is_empty() || !self.data_lines.is_empty() {
            tracing::debug!(
                "Discarding {} buffered bytes at end of stream",
                self.buffer.len()
            );
        }
        self.buffer.clear();
        self.data_lines.clear();
        Some(SessionEvent::TurnError(CLOSED_EARLY.to_string()))
    }

    fn take_line(&mut self) -> Option<Result<String, StreamError>> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut raw = self.buffer.split_to(newline);
        self.buffer.advance(1);
        if raw.last() == Some(&b'\r') {
            raw.truncate(raw.len() - 1);
        }
        Some(
            String::from_utf8(raw.to_vec())
                .map_err(|e| StreamError::protocol(format!("invalid UTF-8 in stream: {}", e))),
        )
    }

    fn dispatch(&mut self) -> Option<Result<SessionEvent, StreamError>> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        if payload.trim().is_empty() {
            return None;
        }

        match parse_payload(&payload) {
            Ok(SessionEvent::TurnEnd) => {
                self.terminated = true;
                Some(Ok(SessionEvent::TurnEnd))
            }
            Ok(event) => Some(Ok(event)),
            Err(e) => Some(self.fail(e)),
        }
    }

    fn fail(&mut self, error: StreamError) -> Result<SessionEvent, StreamError> {
        tracing::warn!(code = error.code(), "{}", error);
        self.terminated = true;
        self.buffer.clear();
        self.data_lines.clear();
        Err(error)
    }
}
