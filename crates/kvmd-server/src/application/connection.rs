//! Per-connection receive loop and heartbeat.
//!
//! Incoming frames are dispatched strictly in arrival order: a handler runs
//! to completion before the next frame is read.  The loop runs in its own
//! task, so a panicking handler cannot skip cleanup: whatever way the task
//! ends, the session is closed through the hub exactly once.  Closing the
//! session from elsewhere (shutdown, heartbeat) wakes a pending read and ends
//! the loop.
//!
//! | Frame             | Action                                        |
//! |-------------------|-----------------------------------------------|
//! | text, valid event | call the handler for `event_type`             |
//! | text, bad JSON    | log and keep reading                          |
//! | text, unknown     | log and keep reading                          |
//! | binary, len >= 1  | call the handler for the first byte           |
//! | ping / pong       | only refresh `last_seen`                      |
//! | empty binary      | end of connection                             |
//! | close / error     | end of connection                             |

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use kvmd_core::{decode_binary, decode_text};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use super::hub::SessionHub;
use super::registry::WsRoutes;
use crate::domain::{TransportError, WsSession};

/// A frame read from the incoming half of a WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close,
}

/// Drives one session until the peer goes away, then closes it via the hub.
pub async fn run_connection<S>(
    hub: Arc<SessionHub>,
    routes: Arc<WsRoutes>,
    session: Arc<WsSession>,
    frames: S,
) where
    S: Stream<Item = Result<InboundFrame, TransportError>> + Send + Unpin + 'static,
{
    let loop_session = Arc::clone(&session);
    let task = tokio::spawn(async move { read_frames(&routes, &loop_session, frames).await });
    if let Err(e) = task.await {
        error!(session = %session.id(), "connection loop aborted: {e}");
    }
    hub.close_session(&session).await;
}

async fn read_frames<S>(routes: &WsRoutes, session: &Arc<WsSession>, mut frames: S)
where
    S: Stream<Item = Result<InboundFrame, TransportError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = session.closed() => {
                debug!(session = %session.id(), "session closed, stopping reads");
                break;
            }
            frame = frames.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!(session = %session.id(), "receive failed: {e}");
                break;
            }
            None => break,
        };
        session.mark_seen();

        match frame {
            InboundFrame::Text(text) => on_text(routes, session, &text).await,
            InboundFrame::Binary(data) => {
                let Ok((opcode, payload)) = decode_binary(&data) else {
                    break;
                };
                on_binary(routes, session, opcode, payload).await;
            }
            InboundFrame::Ping | InboundFrame::Pong => continue,
            InboundFrame::Close => break,
        }
    }
}

async fn on_text(routes: &WsRoutes, session: &Arc<WsSession>, text: &str) {
    let (event_type, event) = match decode_text(text) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!("Can't parse JSON event from websocket: {e}");
            return;
        }
    };
    match routes.text_handler(&event_type) {
        Some(handler) => {
            if let Err(e) = handler(Arc::clone(session), event).await {
                warn!(session = %session.id(), "handler for {event_type:?} failed: {e}");
            }
        }
        None => error!("Unknown websocket event: {text:?}"),
    }
}

async fn on_binary(routes: &WsRoutes, session: &Arc<WsSession>, opcode: u8, payload: &[u8]) {
    match routes.binary_handler(opcode) {
        Some(handler) => {
            if let Err(e) = handler(Arc::clone(session), payload.to_vec()).await {
                warn!(session = %session.id(), "handler for binary opcode {opcode} failed: {e}");
            }
        }
        None => error!("Unknown websocket binary event: opcode={opcode}, len={}", payload.len()),
    }
}

/// Pings the session every `period` and closes it through the hub when a
/// whole period passes after a ping without any frame from the peer.
///
/// Returns once the session is closed, a ping fails, or the peer times out.
pub async fn run_heartbeat(hub: Arc<SessionHub>, session: Arc<WsSession>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    let mut pinged_at: Option<Instant> = None;
    loop {
        tokio::select! {
            () = session.closed() => break,
            _ = ticker.tick() => {}
        }
        if !session.is_alive() {
            break;
        }
        if let Some(sent) = pinged_at {
            if session.last_seen() < sent {
                warn!(session = %session.id(), "no pong within {period:?}, closing");
                hub.close_session(&session).await;
                break;
            }
        }
        pinged_at = Some(Instant::now());
        if let Err(e) = session.ping().await {
            debug!(session = %session.id(), "heartbeat failed: {e}");
            break;
        }
    }
}
