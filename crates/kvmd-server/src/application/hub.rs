//! Registry of live WebSocket sessions.
//!
//! The hub owns the set of open sessions behind one async mutex.  Only
//! membership changes run under the lock: sends, closes and lifecycle hooks
//! always happen on a snapshot taken outside it, so a slow client cannot
//! stall registration of new ones.
//!
//! # Lifecycle
//!
//! ```text
//! open_session ──► [registered] ──► on_opened hook
//!                        │
//! close_session ─────────┘ (first call only) ──► transport.close ──► on_closed hook
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use kvmd_core::{encode_text, EventPayload};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{SessionContext, WsProtocol, WsSession, WsTransport};

/// Callbacks invoked around a session's lifetime.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Runs after the session is registered, before its loop starts.
    async fn on_opened(&self, _session: &Arc<WsSession>) {}

    /// Runs once after the session was removed and its transport closed.
    async fn on_closed(&self, _session: &Arc<WsSession>) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// The set of live sessions.
pub struct SessionHub {
    sessions: Mutex<Vec<Arc<WsSession>>>,
    hooks: Arc<dyn SessionHooks>,
}

impl SessionHub {
    pub fn new(hooks: Arc<dyn SessionHooks>) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            hooks,
        }
    }

    /// Registers a session for an already-upgraded transport.
    pub async fn open_session(
        &self,
        transport: Arc<dyn WsTransport>,
        protocol: WsProtocol,
        context: SessionContext,
    ) -> Arc<WsSession> {
        let session = Arc::new(WsSession::new(transport, protocol, context));
        {
            let mut sessions = self.sessions.lock().await;
            sessions.push(Arc::clone(&session));
            info!(
                "Registered new client session: {session}; clients now: {}",
                sessions.len()
            );
        }
        self.hooks.on_opened(&session).await;
        session
    }

    /// Removes and closes a session.  Later calls for the same session are no-ops.
    pub async fn close_session(&self, session: &Arc<WsSession>) {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            match sessions.iter().position(|s| Arc::ptr_eq(s, session)) {
                Some(index) => {
                    sessions.remove(index);
                    info!(
                        "Closed client session: {session}; clients now: {}",
                        sessions.len()
                    );
                    true
                }
                None => false,
            }
        };
        if !removed {
            return;
        }
        if let Err(e) = session.close().await {
            debug!(session = %session.id(), "close after disconnect: {e}");
        }
        self.hooks.on_closed(session).await;
    }

    /// Sends a text event to every live session concurrently.
    ///
    /// A failure on one session is logged and does not affect the others.
    pub async fn broadcast(&self, event_type: &str, payload: &EventPayload) {
        let sessions = self.list_sessions().await;
        if sessions.is_empty() {
            return;
        }
        let text = encode_text(event_type, payload);
        let sends = sessions
            .iter()
            .filter(|session| session.is_alive())
            .map(|session| {
                let text = text.clone();
                async move {
                    if let Err(e) = session.send_encoded(text).await {
                        debug!(session = %session.id(), "broadcast send failed: {e}");
                    }
                }
            });
        join_all(sends).await;
    }

    /// Closes every session.  Returns `true` if there were any.
    pub async fn close_all(&self) -> bool {
        let sessions = self.list_sessions().await;
        for session in &sessions {
            self.close_session(session).await;
        }
        !sessions.is_empty()
    }

    /// Snapshot of the current sessions.
    pub async fn list_sessions(&self) -> Vec<Arc<WsSession>> {
        self.sessions.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(Arc::new(NoopHooks))
    }
}
