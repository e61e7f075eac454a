//! Protocol module containing the event codec, binary input events and the
//! outbound message type.

pub mod codec;
pub mod input;
pub mod outbound;

pub use codec::{decode_binary, decode_text, encode_binary, encode_text, EventPayload, ProtocolError};
pub use input::{opcode, InputEvent};
pub use outbound::OutboundMessage;
