//! axum WebSocket adapter for the [`WsTransport`] trait.
//!
//! The socket is split once after the upgrade.  The sink half lives behind
//! an async mutex so the connection loop's handlers, hub broadcasts and the
//! heartbeat task can all write to it; the stream half feeds the connection
//! loop as [`InboundFrame`]s.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

use crate::application::InboundFrame;
use crate::domain::{TransportError, WsFrame, WsTransport};

/// The outgoing half of an upgraded axum WebSocket.
pub struct AxumTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl AxumTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WsTransport for AxumTransport {
    async fn send(&self, frame: WsFrame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let message = match frame {
            WsFrame::Text(text) => Message::Text(text.into()),
            WsFrame::Binary(data) => Message::Binary(data.into()),
            WsFrame::Ping => Message::Ping(Vec::new().into()),
        };
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| {
            self.closed.store(true, Ordering::Relaxed);
            TransportError::Io(e.to_string())
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Relaxed);
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl From<Message> for InboundFrame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
            Message::Binary(data) => InboundFrame::Binary(data.to_vec()),
            Message::Ping(_) => InboundFrame::Ping,
            Message::Pong(_) => InboundFrame::Pong,
            Message::Close(_) => InboundFrame::Close,
        }
    }
}
