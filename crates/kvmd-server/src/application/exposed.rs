//! Route declarations published by API components.
//!
//! A component implements [`Exposed`] and returns its HTTP routes and
//! WebSocket event handlers as plain values.  The registry collects them once
//! at startup; nothing is registered by reflection or global state.
//!
//! ```rust,ignore
//! impl Exposed for SystemApi {
//!     fn exposed_ws(&self) -> Vec<WsExposed> {
//!         vec![WsExposed::text("ping", |session, _event| async move {
//!             session.send_event("pong", &EventPayload::new()).await.ok();
//!             Ok(())
//!         })]
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use kvmd_core::EventPayload;

use crate::domain::{ApiError, WsSession};

/// Boxed HTTP handler.  It owns the request and returns the response as-is.
pub type HttpHandler =
    Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Response, ApiError>> + Send + Sync>;

/// Boxed handler for a JSON text event.
pub type WsTextHandler = Arc<
    dyn Fn(Arc<WsSession>, EventPayload) -> BoxFuture<'static, Result<(), ApiError>>
        + Send
        + Sync,
>;

/// Boxed handler for a binary event; receives the payload after the opcode.
pub type WsBinaryHandler =
    Arc<dyn Fn(Arc<WsSession>, Vec<u8>) -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync>;

// ── HTTP ──────────────────────────────────────────────────────────────────────

/// Metadata of an exposed HTTP route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRoute {
    pub method: Method,
    pub path: String,
    /// Run the auth check before the handler.
    pub auth_required: bool,
    /// Accept unix-socket credentials as authentication.
    pub allow_usc: bool,
}

/// An HTTP route together with its handler.
#[derive(Clone)]
pub struct HttpExposed {
    pub route: HttpRoute,
    pub handler: HttpHandler,
}

impl HttpExposed {
    /// Declares a route that requires auth and allows unix-socket credentials.
    pub fn new<F, Fut>(method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        Self {
            route: HttpRoute {
                method,
                path: path.to_string(),
                auth_required: true,
                allow_usc: true,
            },
            handler: Arc::new(move |req| handler(req).boxed()),
        }
    }

    pub fn auth_required(mut self, auth_required: bool) -> Self {
        self.route.auth_required = auth_required;
        self
    }

    pub fn allow_usc(mut self, allow_usc: bool) -> Self {
        self.route.allow_usc = allow_usc;
        self
    }
}

impl fmt::Debug for HttpExposed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExposed")
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

/// Lookup key of a WebSocket handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WsEventKey {
    /// `event_type` of a JSON text frame.
    Text(String),
    /// First byte of a binary frame.
    Binary(u8),
}

impl fmt::Display for WsEventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(event_type) => write!(f, "{event_type:?}"),
            Self::Binary(opcode) => write!(f, "binary opcode {opcode}"),
        }
    }
}

/// A WebSocket event handler.
#[derive(Clone)]
pub enum WsExposed {
    Text {
        event_type: String,
        handler: WsTextHandler,
    },
    Binary {
        opcode: u8,
        handler: WsBinaryHandler,
    },
}

impl WsExposed {
    /// Declares a handler for JSON events of type `event_type`.
    pub fn text<F, Fut>(event_type: &str, handler: F) -> Self
    where
        F: Fn(Arc<WsSession>, EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        Self::Text {
            event_type: event_type.to_string(),
            handler: Arc::new(move |session, event| handler(session, event).boxed()),
        }
    }

    /// Declares a handler for binary frames starting with `opcode`.
    pub fn binary<F, Fut>(opcode: u8, handler: F) -> Self
    where
        F: Fn(Arc<WsSession>, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        Self::Binary {
            opcode,
            handler: Arc::new(move |session, data| handler(session, data).boxed()),
        }
    }

    pub fn key(&self) -> WsEventKey {
        match self {
            Self::Text { event_type, .. } => WsEventKey::Text(event_type.clone()),
            Self::Binary { opcode, .. } => WsEventKey::Binary(*opcode),
        }
    }
}

impl fmt::Debug for WsExposed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WsExposed").field(&self.key()).finish()
    }
}

// ── Component trait ───────────────────────────────────────────────────────────

/// A component that publishes HTTP routes and/or WebSocket handlers.
pub trait Exposed: Send + Sync {
    fn exposed_http(&self) -> Vec<HttpExposed> {
        Vec::new()
    }

    fn exposed_ws(&self) -> Vec<WsExposed> {
        Vec::new()
    }
}
