//! Assistant stream decoding.
//!
//! The backend delivers server-sent events whose `data:` payloads are JSON
//! objects tagged by `type`. [`decode`] turns an arbitrarily chunked byte
//! stream into a finite sequence of [`SessionEvent`]s: it ends after
//! `TurnEnd`, after the first protocol error, or with an implicit
//! `TurnError` when the transport closes or fails first.

mod decoder;
mod frame;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;

pub use self::decoder::{CLOSED_EARLY, StreamDecoder};
use crate::error::{BackendError, StreamError};

/// Structured tool request emitted by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    /// Backend-assigned call id, when the backend provides one.
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Discrete event decoded from the assistant stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TextDelta(String),
    ToolCall(ToolCall),
    ToolResult {
        call_id: Option<String>,
        name: String,
        outcome: serde_json::Value,
    },
    TurnError(String),
    TurnEnd,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta(_) => "text_delta",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::TurnError(_) => "turn_error",
            Self::TurnEnd => "turn_end",
        }
    }
}

/// Decode a chunk stream into session events.
///
/// Each call starts from a fresh [`StreamDecoder`], so the returned stream
/// can be rebuilt per turn. Transport failures surface as `TurnError`;
/// only malformed frames surface as `Err`.
pub fn decode<S>(chunks: S) -> impl Stream<Item = Result<SessionEvent, StreamError>> + Send
where
    S: Stream<Item = Result<Bytes, BackendError>> + Send + Unpin,
{
    futures::stream::unfold(Some((chunks, StreamDecoder::new())), |state| async move {
        let (mut chunks, mut decoder) = state?;
        loop {
            if let Some(item) = decoder.next_event() {
                let next = if decoder.is_terminated() {
                    None
                } else {
                    Some((chunks, decoder))
                };
                return Some((item, next));
            }
            if decoder.is_terminated() {
                return None;
            }

            match chunks.next().await {
                Some(Ok(bytes)) => decoder.feed(&bytes),
                Some(Err(e)) => {
                    tracing::warn!(code = e.code(), "Assistant stream failed: {}", e);
                    return Some((
                        Ok(SessionEvent::TurnError(format!(
                            "Assistant stream interrupted: {}",
                            e
                        ))),
                        None,
                    ));
                }
                None => return decoder.finish().map(|event| (Ok(event), None)),
            }
        }
    })
}
