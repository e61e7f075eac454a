//! Outbound queue and writer handles for one client connection.
//!
//! Any number of producers may hold a [`ClientWriter`]; each call enqueues
//! one item and returns immediately.  The single consumer, the connection
//! loop, pops items in order and writes them to the socket, so a frame is
//! never written by two producers at once and items leave in the order they
//! were enqueued.

use kvmd_core::{EventPayload, InputEvent, OutboundMessage};
use thiserror::Error;
use tokio::sync::mpsc;

/// A text event received from the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    pub event_type: String,
    pub payload: EventPayload,
}

/// Errors returned by [`ClientWriter`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriterError {
    /// The connection loop is gone; nothing will be sent.
    #[error("connection writer has shut down")]
    Closed,
    /// Key and button names travel as ASCII on the wire.
    #[error("name {0:?} is not ASCII")]
    NotAscii(String),
}

/// An item in the outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Queued {
    Message(OutboundMessage),
    /// Close the connection once everything queued before it has been sent.
    Shutdown,
}

/// Consumer side of the queue, owned by the connection loop.
pub type OutboundQueue = mpsc::UnboundedReceiver<Queued>;

/// Creates a connected writer/queue pair.
pub fn outbound_queue() -> (ClientWriter, OutboundQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ClientWriter { tx }, rx)
}

/// Cloneable producer handle for one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ClientWriter {
    tx: mpsc::UnboundedSender<Queued>,
}

impl ClientWriter {
    /// Enqueues a message.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the connection loop has ended.
    pub fn send(&self, message: OutboundMessage) -> Result<(), WriterError> {
        self.push(Queued::Message(message))
    }

    /// Enqueues a JSON text event.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the connection loop has ended.
    pub fn send_event(&self, event_type: &str, payload: EventPayload) -> Result<(), WriterError> {
        self.send(OutboundMessage::event(event_type, payload))
    }

    /// Enqueues a binary key event (opcode 1).
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::NotAscii`] for a non-ASCII key name, or
    /// [`WriterError::Closed`] if the connection loop has ended.
    pub fn send_key_event(&self, key: &str, state: bool) -> Result<(), WriterError> {
        self.send(
            InputEvent::Key {
                key: ascii_name(key)?,
                state,
                finish: false,
            }
            .into(),
        )
    }

    /// Enqueues a binary mouse button event (opcode 2).
    ///
    /// # Errors
    ///
    /// Same as [`ClientWriter::send_key_event`].
    pub fn send_mouse_button_event(&self, button: &str, state: bool) -> Result<(), WriterError> {
        self.send(
            InputEvent::MouseButton {
                button: ascii_name(button)?,
                state,
            }
            .into(),
        )
    }

    /// Enqueues a binary absolute move (opcode 3).
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the connection loop has ended.
    pub fn send_mouse_move_event(&self, to_x: i16, to_y: i16) -> Result<(), WriterError> {
        self.send(InputEvent::MouseMove { to_x, to_y }.into())
    }

    /// Enqueues a single relative move (opcode 4).
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the connection loop has ended.
    pub fn send_mouse_relative_event(&self, delta_x: i8, delta_y: i8) -> Result<(), WriterError> {
        self.send(
            InputEvent::MouseRelative {
                deltas: vec![(delta_x, delta_y)],
                squash: false,
            }
            .into(),
        )
    }

    /// Enqueues a single wheel step (opcode 5).
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the connection loop has ended.
    pub fn send_mouse_wheel_event(&self, delta_x: i8, delta_y: i8) -> Result<(), WriterError> {
        self.send(
            InputEvent::MouseWheel {
                deltas: vec![(delta_x, delta_y)],
                squash: false,
            }
            .into(),
        )
    }

    /// Asks the connection loop to close the socket after flushing
    /// everything queued so far.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::Closed`] if the connection loop has ended.
    pub fn close(&self) -> Result<(), WriterError> {
        self.push(Queued::Shutdown)
    }

    fn push(&self, item: Queued) -> Result<(), WriterError> {
        self.tx.send(item).map_err(|_| WriterError::Closed)
    }
}

fn ascii_name(name: &str) -> Result<String, WriterError> {
    if name.is_ascii() {
        Ok(name.to_string())
    } else {
        Err(WriterError::NotAscii(name.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
