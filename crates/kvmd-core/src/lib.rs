//! # kvmd-core
//!
//! Shared wire protocol for the kvmd daemon and its clients.
//!
//! Both the server (`kvmd-server`) and the client library (`kvmd-client`)
//! speak the same two WebSocket frame formats over a single socket:
//!
//! - **Text frames** carry JSON events: `{"event_type": "...", "event": {...}}`.
//! - **Binary frames** carry low-latency input: `[opcode:1][payload:N]`.
//!
//! This crate has no I/O and no async runtime dependency.  It defines:
//!
//! - **`protocol`** – the event codec ([`encode_text`], [`decode_text`],
//!   [`encode_binary`], [`decode_binary`]), the binary input events sent by
//!   clients ([`InputEvent`]), and the queued [`OutboundMessage`].
//!
//! - **`domain`** – mouse coordinate math shared by the HID layer: remapping
//!   absolute positions into a configured range and squashing relative deltas.

pub mod domain;
pub mod protocol;

pub use domain::mouse::{clamp_delta, squash_deltas, MouseRange};
pub use protocol::codec::{
    decode_binary, decode_text, encode_binary, encode_text, EventPayload, ProtocolError,
};
pub use protocol::input::InputEvent;
pub use protocol::outbound::OutboundMessage;
