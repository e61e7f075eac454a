//! WebSocket connection to a kvmd daemon over its unix socket.
//!
//! [`KvmdClient`] holds the socket path and credentials and opens
//! connections.  Each connection is a [`ClientWs`], which owns the socket
//! and its outbound queue.  [`ClientWs::communicate`] consumes the
//! connection, so a connection can be driven only once.
//!
//! # Loop
//!
//! ```text
//!            ┌── next inbound frame ──► text: decode, forward to events_tx
//! select! ───┤                          close: complete the handshake
//!            │                          end of stream: return
//!            └── next queued item ────► message: write to the socket
//!                                       shutdown: send Close, keep reading
//! ```
//!
//! Whichever side is ready first is handled, then both are waited on again.
//! On return the socket is always closed.

use std::path::{Path, PathBuf};

use futures_util::{SinkExt, StreamExt};
use kvmd_core::{decode_text, encode_text, OutboundMessage, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{client_async, WebSocketStream};
use tracing::{debug, info};

use crate::application::session::{
    outbound_queue, ClientEvent, ClientWriter, OutboundQueue, Queued,
};

/// Socket the daemon listens on by default.
pub const DEFAULT_UNIX_PATH: &str = "/run/kvmd/kvmd.sock";

/// Upgrade URL.  The host is ignored on a unix socket.
const WS_URL: &str = "ws://localhost/ws?legacy=0";

/// Errors that can occur on a client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The unix socket could not be reached.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Handshake or framing failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// A credential cannot be sent as an HTTP header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    /// The daemon sent a text frame that is not a valid event.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The daemon never sends binary frames on this endpoint.
    #[error("unexpected binary frame from server")]
    UnexpectedBinary,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Connection settings for one daemon.
#[derive(Debug, Clone)]
pub struct KvmdClient {
    unix_path: PathBuf,
    user: String,
    passwd: String,
}

impl KvmdClient {
    pub fn new(
        unix_path: impl Into<PathBuf>,
        user: impl Into<String>,
        passwd: impl Into<String>,
    ) -> Self {
        Self {
            unix_path: unix_path.into(),
            user: user.into(),
            passwd: passwd.into(),
        }
    }

    pub fn unix_path(&self) -> &Path {
        &self.unix_path
    }

    /// Connects and upgrades to the event WebSocket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the socket is unreachable,
    /// [`ClientError::InvalidHeader`] for credentials that are not valid
    /// header values, and [`ClientError::WebSocket`] if the upgrade fails
    /// (including an auth rejection by the daemon).
    pub async fn ws(&self) -> Result<ClientWs<UnixStream>, ClientError> {
        let stream = UnixStream::connect(&self.unix_path)
            .await
            .map_err(|source| ClientError::Connect {
                path: self.unix_path.clone(),
                source,
            })?;

        let mut request = WS_URL.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("X-KVMD-User", HeaderValue::from_str(&self.user)?);
        headers.insert("X-KVMD-Passwd", HeaderValue::from_str(&self.passwd)?);

        let (ws, response) = client_async(request, stream).await?;
        info!(
            status = %response.status(),
            "connected to kvmd at {}",
            self.unix_path.display()
        );
        Ok(ClientWs::new(ws))
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// One open WebSocket connection and its outbound queue.
pub struct ClientWs<S> {
    ws: WebSocketStream<S>,
    writer: ClientWriter,
    queue: OutboundQueue,
    closing: bool,
}

impl<S> ClientWs<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already upgraded WebSocket.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (writer, queue) = outbound_queue();
        Self {
            ws,
            writer,
            queue,
            closing: false,
        }
    }

    /// A handle for enqueueing outbound messages.  Writers stay usable until
    /// [`ClientWs::communicate`] returns.
    pub fn writer(&self) -> ClientWriter {
        self.writer.clone()
    }

    /// Runs the connection until the daemon goes away or a queued shutdown
    /// completes, forwarding every text event to `events`.
    ///
    /// If `events` has no receiver, events are discarded.
    ///
    /// # Errors
    ///
    /// Returns the first transport or protocol error.  The socket is closed
    /// either way.
    pub async fn communicate(mut self, events: mpsc::Sender<ClientEvent>) -> Result<(), ClientError> {
        let result = self.run(&events).await;
        self.queue.close();
        if let Err(e) = self.ws.close(None).await {
            debug!("close after communicate: {e}");
        }
        result
    }

    async fn run(&mut self, events: &mpsc::Sender<ClientEvent>) -> Result<(), ClientError> {
        loop {
            tokio::select! {
                frame = self.ws.next() => match frame {
                    Some(frame) => self.on_frame(frame?, events).await?,
                    None => return Ok(()),
                },
                Some(item) = self.queue.recv() => self.on_queued(item).await?,
            }
        }
    }

    async fn on_frame(
        &mut self,
        message: Message,
        events: &mpsc::Sender<ClientEvent>,
    ) -> Result<(), ClientError> {
        match message {
            Message::Text(text) => {
                let (event_type, payload) = decode_text(&text)?;
                if events
                    .send(ClientEvent {
                        event_type,
                        payload,
                    })
                    .await
                    .is_err()
                {
                    debug!("no event receiver, event discarded");
                }
            }
            Message::Close(frame) => {
                debug!("server closed the connection: {frame:?}");
                // Flushes the close reply tungstenite has already queued.
                if let Err(e) = self.ws.close(None).await {
                    debug!("close reply: {e}");
                }
                self.closing = true;
            }
            Message::Binary(_) => return Err(ClientError::UnexpectedBinary),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
        Ok(())
    }

    async fn on_queued(&mut self, item: Queued) -> Result<(), ClientError> {
        if self.closing {
            debug!("connection is closing, dropping {item:?}");
            return Ok(());
        }
        match item {
            Queued::Message(OutboundMessage::Event {
                event_type,
                payload,
            }) => {
                self.ws
                    .send(Message::Text(encode_text(&event_type, &payload)))
                    .await?;
            }
            Queued::Message(OutboundMessage::Binary(frame)) => {
                self.ws.send(Message::Binary(frame)).await?;
            }
            Queued::Shutdown => {
                debug!("shutdown requested, closing connection");
                self.closing = true;
                self.ws.close(None).await?;
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
