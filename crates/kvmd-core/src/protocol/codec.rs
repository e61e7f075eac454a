//! Event codec for the two WebSocket frame formats.
//!
//! Wire formats:
//! ```text
//! text:   {"event_type": "<string>", "event": {<object>}}
//! binary: [opcode:1][payload:N]
//! ```
//!
//! JSON objects are backed by `serde_json::Map`, which keeps keys sorted, so
//! encoded text events are canonical: the same event always produces the
//! same bytes.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// The body of a text event: always a JSON object.
pub type EventPayload = Map<String, Value>;

/// Errors that can occur while decoding a WebSocket frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The text frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The top-level JSON value is not an object.
    #[error("top-level event structure is not an object")]
    NotAnObject,

    /// `event_type` is missing or is not a string.
    #[error("event_type must be a string")]
    InvalidEventType,

    /// `event` is missing or is not an object.
    #[error("event must be an object")]
    InvalidEvent,

    /// A binary frame with no opcode byte.
    #[error("empty binary frame")]
    EmptyFrame,

    /// The binary payload is shorter than the opcode requires.
    #[error("opcode {opcode}: need at least {needed} payload bytes, got {available}")]
    InsufficientData {
        opcode: u8,
        needed: usize,
        available: usize,
    },

    /// The binary payload could not be parsed (wrong length, non-ASCII name, etc.).
    #[error("opcode {opcode}: malformed payload: {reason}")]
    MalformedPayload { opcode: u8, reason: String },

    /// The opcode is not a known input event.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
}

// ── Text frames ───────────────────────────────────────────────────────────────

/// Encodes a text event as canonical JSON.
///
/// # Examples
///
/// ```rust
/// use kvmd_core::{decode_text, encode_text, EventPayload};
///
/// let mut payload = EventPayload::new();
/// payload.insert("online".to_string(), true.into());
/// let text = encode_text("hid", &payload);
/// assert_eq!(text, r#"{"event":{"online":true},"event_type":"hid"}"#);
/// assert_eq!(decode_text(&text).unwrap(), ("hid".to_string(), payload));
/// ```
pub fn encode_text(event_type: &str, payload: &EventPayload) -> String {
    json!({
        "event_type": event_type,
        "event": payload,
    })
    .to_string()
}

/// Decodes a text event into its type and payload.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the text is not JSON, the top-level value is
/// not an object, `event_type` is not a string, or `event` is not an object.
pub fn decode_text(text: &str) -> Result<(String, EventPayload), ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let Value::Object(mut root) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let event_type = match root.remove("event_type") {
        Some(Value::String(event_type)) => event_type,
        _ => return Err(ProtocolError::InvalidEventType),
    };

    let event = match root.remove("event") {
        Some(Value::Object(event)) => event,
        _ => return Err(ProtocolError::InvalidEvent),
    };

    Ok((event_type, event))
}

// ── Binary frames ─────────────────────────────────────────────────────────────

/// Prepends the opcode byte to `payload`.
pub fn encode_binary(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(opcode);
    buf.extend_from_slice(payload);
    buf
}

/// Splits a binary frame into its opcode and payload.
///
/// # Errors
///
/// Returns [`ProtocolError::EmptyFrame`] if `frame` is empty.
pub fn decode_binary(frame: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    match frame.split_first() {
        Some((opcode, payload)) => Ok((*opcode, payload)),
        None => Err(ProtocolError::EmptyFrame),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
