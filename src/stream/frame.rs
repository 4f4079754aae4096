//! JSON payloads carried in `data:` lines of the assistant stream.

use serde::Deserialize;

use super::{SessionEvent, ToolCall};
use crate::error::StreamError;

/// Payload literal that ends a turn, accepted alongside `{"type":"end"}`.
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    TextDelta {
        text: String,
    },
    ToolCall {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        outcome: serde_json::Value,
    },
    Error {
        message: String,
    },
    End,
}

/// Parse one complete frame payload into a session event.
pub(crate) fn parse_payload(payload: &str) -> Result<SessionEvent, StreamError> {
    if payload.trim() == DONE_SENTINEL {
        return Ok(SessionEvent::TurnEnd);
    }

    let frame: Frame = serde_json::from_str(payload)
        .map_err(|e| StreamError::protocol(format!("{}, data: {}", e, truncate(payload))))?;

    Ok(match frame {
        Frame::TextDelta { text } => SessionEvent::TextDelta(text),
        Frame::ToolCall {
            id,
            name,
            arguments,
        } => {
            if name.trim().is_empty() {
                return Err(StreamError::protocol("tool_call frame has an empty name"));
            }
            SessionEvent::ToolCall(ToolCall {
                id,
                name,
                arguments: normalize_arguments(arguments)?,
            })
        }
        Frame::ToolResult { id, name, outcome } => SessionEvent::ToolResult {
            call_id: id,
            name,
            outcome,
        },
        Frame::Error { message } => SessionEvent::TurnError(message),
        Frame::End => SessionEvent::TurnEnd,
    })
}

/// Some backends send arguments as a JSON-encoded string; unwrap those.
fn normalize_arguments(arguments: serde_json::Value) -> Result<serde_json::Value, StreamError> {
    match arguments {
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        serde_json::Value::String(raw) if raw.trim().is_empty() => {
            Ok(serde_json::Value::Object(Default::default()))
        }
        serde_json::Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| StreamError::protocol(format!("tool_call arguments are not JSON: {}", e))),
        other => Ok(other),
    }
}

fn truncate(payload: &str) -> &str {
    const MAX: usize = 120;
    match payload.char_indices().nth(MAX) {
        Some((cut, _)) => &payload[..cut],
        None => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_frame_type() {
        assert_eq!(
            parse_payload(r#"{"type":"text_delta","text":"hi"}"#).unwrap(),
            SessionEvent::TextDelta("hi".to_string())
        );
        assert_eq!(
            parse_payload(r#"{"type":"error","message":"quota"}"#).unwrap(),
            SessionEvent::TurnError("quota".to_string())
        );
        assert_eq!(parse_payload(r#"{"type":"end"}"#).unwrap(), SessionEvent::TurnEnd);
        assert_eq!(parse_payload("[DONE]").unwrap(), SessionEvent::TurnEnd);
    }

    #[test]
    fn tool_call_arguments_may_be_encoded_as_string() {
        let event =
            parse_payload(r#"{"type":"tool_call","name":"register","arguments":"{\"name\":\"x\"}"}"#)
                .unwrap();
        match event {
            SessionEvent::ToolCall(call) => {
                assert_eq!(call.name, "register");
                assert_eq!(call.arguments, serde_json::json!({"name": "x"}));
                assert_eq!(call.id, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn missing_arguments_default_to_empty_object() {
        match parse_payload(r#"{"type":"tool_call","id":"c1","name":"swap"}"#).unwrap() {
            SessionEvent::ToolCall(call) => {
                assert_eq!(call.arguments, serde_json::json!({}));
                assert_eq!(call.id.as_deref(), Some("c1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_type_and_bad_json() {
        assert!(parse_payload(r#"{"type":"telemetry"}"#).is_err());
        assert!(parse_payload(r#"{"type":"text_delta""#).is_err());
        assert!(parse_payload(r#"{"type":"tool_call","name":"  "}"#).is_err());
        assert!(
            parse_payload(r#"{"type":"tool_call","name":"x","arguments":"{oops"}"#).is_err()
        );
    }
}
