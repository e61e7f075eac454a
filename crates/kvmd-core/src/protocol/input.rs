//! Binary input events sent from clients to the daemon.
//!
//! Every input event travels as one binary WebSocket frame: the first byte is
//! the opcode and the rest is an opcode-specific payload.
//!
//! ```text
//! 1  key             [mask][ascii key name]        mask bit0 = pressed, bit1 = finish
//! 2  mouse button    [mask][ascii button name]     mask bit0 = pressed
//! 3  mouse move      [x:i16 BE][y:i16 BE]          absolute position
//! 4  mouse relative  [mask]([dx:i8][dy:i8])*        mask bit0 = squash
//! 5  mouse wheel     [mask]([dx:i8][dy:i8])*        mask bit0 = squash
//! ```

use super::codec::{decode_binary, encode_binary, ProtocolError};

/// Opcodes of the binary input events.
pub mod opcode {
    pub const KEY: u8 = 1;
    pub const MOUSE_BUTTON: u8 = 2;
    pub const MOUSE_MOVE: u8 = 3;
    pub const MOUSE_RELATIVE: u8 = 4;
    pub const MOUSE_WHEEL: u8 = 5;
}

const MASK_STATE: u8 = 0b01;
const MASK_FINISH: u8 = 0b10;
const MASK_SQUASH: u8 = 0b01;

/// A decoded binary input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A keyboard key was pressed or released.
    Key {
        /// Web key name, e.g. `"KeyA"` or `"ShiftLeft"`.
        key: String,
        /// `true` when pressed.
        state: bool,
        /// `true` when the client asks the HID to flush after this key.
        finish: bool,
    },
    /// A mouse button was pressed or released.
    MouseButton { button: String, state: bool },
    /// Absolute pointer position in the full signed 16-bit range.
    MouseMove { to_x: i16, to_y: i16 },
    /// A batch of relative pointer deltas.
    MouseRelative { deltas: Vec<(i8, i8)>, squash: bool },
    /// A batch of wheel deltas.
    MouseWheel { deltas: Vec<(i8, i8)>, squash: bool },
}

impl InputEvent {
    /// Returns the opcode this event is sent under.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Key { .. } => opcode::KEY,
            Self::MouseButton { .. } => opcode::MOUSE_BUTTON,
            Self::MouseMove { .. } => opcode::MOUSE_MOVE,
            Self::MouseRelative { .. } => opcode::MOUSE_RELATIVE,
            Self::MouseWheel { .. } => opcode::MOUSE_WHEEL,
        }
    }

    /// Encodes the event into a complete binary frame (opcode included).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kvmd_core::InputEvent;
    ///
    /// let frame = InputEvent::MouseMove { to_x: 10, to_y: -5 }.encode();
    /// assert_eq!(frame, vec![3, 0x00, 0x0A, 0xFF, 0xFB]);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Self::Key { key, state, finish } => {
                let mut mask = 0;
                if *state {
                    mask |= MASK_STATE;
                }
                if *finish {
                    mask |= MASK_FINISH;
                }
                payload.push(mask);
                payload.extend_from_slice(key.as_bytes());
            }
            Self::MouseButton { button, state } => {
                payload.push(if *state { MASK_STATE } else { 0 });
                payload.extend_from_slice(button.as_bytes());
            }
            Self::MouseMove { to_x, to_y } => {
                payload.extend_from_slice(&to_x.to_be_bytes());
                payload.extend_from_slice(&to_y.to_be_bytes());
            }
            Self::MouseRelative { deltas, squash } | Self::MouseWheel { deltas, squash } => {
                payload.push(if *squash { MASK_SQUASH } else { 0 });
                for (dx, dy) in deltas {
                    payload.push(*dx as u8);
                    payload.push(*dy as u8);
                }
            }
        }
        encode_binary(self.opcode(), &payload)
    }

    /// Decodes a complete binary frame (opcode included).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the frame is empty, the opcode is unknown,
    /// or the payload does not match the opcode's layout.
    pub fn from_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (opcode, payload) = decode_binary(frame)?;
        Self::decode(opcode, payload)
    }

    /// Decodes the payload of a frame whose opcode has already been split off.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the opcode is unknown or the payload is
    /// malformed.
    pub fn decode(opcode: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        match opcode {
            opcode::KEY => {
                let (mask, key) = decode_named(opcode, payload)?;
                Ok(Self::Key {
                    key,
                    state: mask & MASK_STATE != 0,
                    finish: mask & MASK_FINISH != 0,
                })
            }
            opcode::MOUSE_BUTTON => {
                let (mask, button) = decode_named(opcode, payload)?;
                Ok(Self::MouseButton {
                    button,
                    state: mask & MASK_STATE != 0,
                })
            }
            opcode::MOUSE_MOVE => {
                let bytes: [u8; 4] =
                    payload
                        .try_into()
                        .map_err(|_| ProtocolError::MalformedPayload {
                            opcode,
                            reason: format!("expected 4 bytes, got {}", payload.len()),
                        })?;
                Ok(Self::MouseMove {
                    to_x: i16::from_be_bytes([bytes[0], bytes[1]]),
                    to_y: i16::from_be_bytes([bytes[2], bytes[3]]),
                })
            }
            opcode::MOUSE_RELATIVE => {
                let (deltas, squash) = decode_deltas(opcode, payload)?;
                Ok(Self::MouseRelative { deltas, squash })
            }
            opcode::MOUSE_WHEEL => {
                let (deltas, squash) = decode_deltas(opcode, payload)?;
                Ok(Self::MouseWheel { deltas, squash })
            }
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Parses `[mask][ascii name]`.
fn decode_named(opcode: u8, payload: &[u8]) -> Result<(u8, String), ProtocolError> {
    let Some((mask, name)) = payload.split_first() else {
        return Err(ProtocolError::InsufficientData {
            opcode,
            needed: 2,
            available: 0,
        });
    };
    if name.is_empty() {
        return Err(ProtocolError::InsufficientData {
            opcode,
            needed: 2,
            available: 1,
        });
    }
    if !name.is_ascii() {
        return Err(ProtocolError::MalformedPayload {
            opcode,
            reason: "name is not ASCII".to_string(),
        });
    }
    // ASCII is always valid UTF-8.
    let name = String::from_utf8_lossy(name).into_owned();
    Ok((*mask, name))
}

/// Parses `[mask]([dx][dy])*`.
fn decode_deltas(opcode: u8, payload: &[u8]) -> Result<(Vec<(i8, i8)>, bool), ProtocolError> {
    let Some((mask, pairs)) = payload.split_first() else {
        return Err(ProtocolError::InsufficientData {
            opcode,
            needed: 1,
            available: 0,
        });
    };
    if pairs.len() % 2 != 0 {
        return Err(ProtocolError::MalformedPayload {
            opcode,
            reason: format!("odd number of delta bytes: {}", pairs.len()),
        });
    }
    let deltas = pairs
        .chunks_exact(2)
        .map(|pair| (pair[0] as i8, pair[1] as i8))
        .collect();
    Ok((deltas, mask & MASK_SQUASH != 0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
