//! Shared fixtures for kvmd-server integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kvmd_server::application::SessionHooks;
use kvmd_server::domain::{TransportError, WsFrame, WsSession, WsTransport};

/// Transport that records every frame written to it.
#[derive(Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<WsFrame>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
    close_calls: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport whose writes always fail but which still reports alive.
    pub fn failing() -> Arc<Self> {
        let transport = Self::default();
        transport.fail_sends.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn frames(&self) -> Vec<WsFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                WsFrame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Simulates the peer disappearing without a close handshake.
    pub fn drop_connection(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WsTransport for RecordingTransport {
    async fn send(&self, frame: WsFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection reset by peer".to_string()));
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hooks that count their invocations.
#[derive(Default)]
pub struct CountingHooks {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl CountingHooks {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHooks for CountingHooks {
    async fn on_opened(&self, _session: &Arc<WsSession>) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_closed(&self, _session: &Arc<WsSession>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
