//! WebSocket session model.
//!
//! A [`WsSession`] is one live client connection.  It owns a handle to the
//! outgoing half of the socket through the [`WsTransport`] trait, so the hub,
//! handlers and tests never depend on a concrete WebSocket library.
//!
//! Sessions are shared as `Arc<WsSession>` between the hub (for broadcast),
//! the connection loop (for dispatch) and the heartbeat task.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use kvmd_core::{encode_binary, encode_text, EventPayload, OutboundMessage};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-session metadata captured at upgrade time (peer credentials, etc.).
pub type SessionContext = serde_json::Map<String, serde_json::Value>;

/// Framing variant negotiated through the `legacy` query parameter.
///
/// Both variants use the same frame formats today; the flag is kept on the
/// session so handlers can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WsProtocol {
    Current,
    Legacy,
}

impl WsProtocol {
    /// Maps the parsed `legacy` flag to a protocol variant.
    pub fn from_legacy_flag(legacy: bool) -> Self {
        if legacy {
            Self::Legacy
        } else {
            Self::Current
        }
    }
}

/// A frame queued on the outgoing half of a WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
}

/// Failure writing to or closing a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was already closed.
    #[error("transport is closed")]
    Closed,

    /// The underlying socket reported an error.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// The outgoing half of a WebSocket connection.
#[async_trait]
pub trait WsTransport: Send + Sync {
    /// Writes one frame.
    async fn send(&self, frame: WsFrame) -> Result<(), TransportError>;

    /// Sends a Close frame and marks the transport closed.  Calling it on a
    /// closed transport is allowed and may return an error.
    async fn close(&self) -> Result<(), TransportError>;

    /// `true` once the transport was closed or a write failed.
    fn is_closed(&self) -> bool;
}

/// One live WebSocket client.
pub struct WsSession {
    id: Uuid,
    transport: Arc<dyn WsTransport>,
    protocol: WsProtocol,
    context: SessionContext,
    detached: CancellationToken,
    last_seen: Mutex<Instant>,
}

impl WsSession {
    pub fn new(
        transport: Arc<dyn WsTransport>,
        protocol: WsProtocol,
        context: SessionContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            protocol,
            context,
            detached: CancellationToken::new(),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn protocol(&self) -> WsProtocol {
        self.protocol
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// `true` while the session is attached to its connection and the
    /// transport accepts writes.
    pub fn is_alive(&self) -> bool {
        !self.detached.is_cancelled() && !self.transport.is_closed()
    }

    /// Resolves once [`WsSession::close`] has been called.
    pub async fn closed(&self) {
        self.detached.cancelled().await;
    }

    /// Records that a frame (pongs included) arrived from the peer.
    pub fn mark_seen(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// When the peer was last heard from; the open time until the first frame.
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a JSON text event.
    pub async fn send_event(
        &self,
        event_type: &str,
        payload: &EventPayload,
    ) -> Result<(), TransportError> {
        self.send_encoded(encode_text(event_type, payload)).await
    }

    /// Sends a binary frame `[opcode][payload]`.
    pub async fn send_bin(&self, opcode: u8, payload: &[u8]) -> Result<(), TransportError> {
        self.transport
            .send(WsFrame::Binary(encode_binary(opcode, payload)))
            .await
    }

    /// Sends a queued outbound message in whichever framing it carries.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        match message {
            OutboundMessage::Event {
                event_type,
                payload,
            } => self.send_event(&event_type, &payload).await,
            OutboundMessage::Binary(frame) => self.transport.send(WsFrame::Binary(frame)).await,
        }
    }

    /// Sends an already-encoded text event; used by broadcast to encode once.
    pub(crate) async fn send_encoded(&self, text: String) -> Result<(), TransportError> {
        self.transport.send(WsFrame::Text(text)).await
    }

    /// Sends a WebSocket Ping control frame.
    pub async fn ping(&self) -> Result<(), TransportError> {
        self.transport.send(WsFrame::Ping).await
    }

    /// Detaches the session from its connection, waking any pending read,
    /// and closes the transport.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.detached.cancel();
        self.transport.close().await
    }
}

impl fmt::Debug for WsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSession")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("alive", &self.is_alive())
            .field("context", &self.context)
            .finish()
    }
}

impl fmt::Display for WsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WsSession(id={}, protocol={:?}, {})",
            self.id,
            self.protocol,
            serde_json::Value::Object(self.context.clone())
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
