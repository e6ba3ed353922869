//! Host Wire Protocol
//!
//! Envelope types exchanged with the host over the WebSocket connection.
//!
//! Requests carry `{id, command, params}`. Responses echo the `id` and carry
//! either `{success: true, result}` or `{success: false, error: {code,
//! message}}`. Unsolicited events carry a `type` discriminator and a `data`
//! payload instead of an `id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::codes;

/// Outgoing request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub command: String,
    pub params: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn new(id: impl Into<String>, command: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            params,
        }
    }
}

/// Error body of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A response envelope interpreted as success or failure
#[derive(Debug, Clone, PartialEq)]
pub enum HostReply {
    Success(Value),
    Failure(ErrorBody),
}

impl HostReply {
    /// Interpret a raw response envelope
    ///
    /// An envelope without a `success` flag is treated as a success whose
    /// result is the `result` field, or the envelope itself minus `id`/`type`.
    /// Host error codes are kept verbatim.
    pub fn from_envelope(envelope: Value) -> Self {
        let mut fields = match envelope {
            Value::Object(fields) => fields,
            other => return HostReply::Success(other),
        };

        match fields.get("success").and_then(Value::as_bool) {
            Some(false) => HostReply::Failure(error_body(fields.remove("error"))),
            Some(true) => HostReply::Success(fields.remove("result").unwrap_or(Value::Null)),
            None => {
                if let Some(result) = fields.remove("result") {
                    return HostReply::Success(result);
                }
                fields.remove("id");
                fields.remove("type");
                HostReply::Success(Value::Object(fields))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HostReply::Success(_))
    }
}

fn error_body(error: Option<Value>) -> ErrorBody {
    match error {
        Some(Value::Object(error)) => {
            let code = error
                .get("code")
                .map(|code| match code {
                    Value::String(code) => code.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| codes::HOST_ERROR.to_string());
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Host reported an error")
                .to_string();
            ErrorBody::new(code, message)
        }
        Some(Value::String(message)) => ErrorBody::new(codes::HOST_ERROR, message),
        _ => ErrorBody::new(codes::HOST_ERROR, "Host reported an error"),
    }
}

/// Unsolicited host event types the bridge understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Editor/game log line broadcast
    Log,
    /// A game instance attached to the editor
    GameConnected,
    /// A game instance detached from the editor
    GameDisconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Log,
        EventKind::GameConnected,
        EventKind::GameDisconnected,
    ];

    /// Map a wire `type` discriminator to an event kind
    pub fn from_wire_type(wire_type: &str) -> Option<Self> {
        match wire_type {
            "log_event" => Some(EventKind::Log),
            "game_connected" => Some(EventKind::GameConnected),
            "game_disconnected" => Some(EventKind::GameDisconnected),
            _ => None,
        }
    }

    /// Subscription key listeners register under
    pub fn key(&self) -> &'static str {
        match self {
            EventKind::Log => "log",
            EventKind::GameConnected => "game_connected",
            EventKind::GameDisconnected => "game_disconnected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Correlation id of an inbound envelope, if it carries a string `id`
pub fn frame_id(envelope: &Value) -> Option<&str> {
    envelope.get("id").and_then(Value::as_str)
}

/// Event kind and payload of an inbound envelope, if it is a known event
pub fn frame_event(envelope: &Value) -> Option<(EventKind, Value)> {
    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .and_then(EventKind::from_wire_type)?;
    let data = envelope
        .get("data")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    Some((kind, data))
}

/// First hundred bytes of `text` for log lines, cut on a char boundary
pub(crate) fn preview(text: &str) -> &str {
    let mut end = text.len().min(100);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
