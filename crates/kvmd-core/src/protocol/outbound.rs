//! Messages queued for sending on a WebSocket.

use super::codec::{encode_binary, EventPayload};
use super::input::InputEvent;

/// One item in a per-connection outbound queue.
///
/// Queues are strict FIFO: a connection's writer sends items in the order
/// they were enqueued, regardless of which producer enqueued them.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A JSON text event.
    Event {
        event_type: String,
        payload: EventPayload,
    },
    /// A pre-built binary frame, opcode included.
    Binary(Vec<u8>),
}

impl OutboundMessage {
    /// Builds a text event.
    pub fn event(event_type: impl Into<String>, payload: EventPayload) -> Self {
        Self::Event {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Builds a binary frame from an opcode and payload.
    pub fn binary(opcode: u8, payload: &[u8]) -> Self {
        Self::Binary(encode_binary(opcode, payload))
    }
}

impl From<InputEvent> for OutboundMessage {
    fn from(event: InputEvent) -> Self {
        Self::Binary(event.encode())
    }
}
