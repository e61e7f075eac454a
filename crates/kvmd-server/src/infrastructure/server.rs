//! The unix-socket HTTP server.
//!
//! [`HttpServer`] turns the registry into an axum router, adds the WebSocket
//! upgrade endpoint, and serves it on a unix socket until the shutdown
//! future resolves.
//!
//! # Request path
//!
//! ```text
//! unix socket ─► NormalizePath (trim trailing '/') ─► Router ─► dispatch ─► handler
//!                                                        │
//!                                   GET <ws_path> ───────┴─► upgrade ─► connection loop
//! ```
//!
//! # Shutdown
//!
//! When the shutdown future resolves the server stops accepting, closes all
//! WebSocket sessions through the hub, then waits for in-flight requests.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::WebSocket;
use axum::extract::{FromRequestParts, Request, WebSocketUpgrade};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::{Router, ServiceExt};
use futures_util::StreamExt;
use serde_json::Value;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tracing::info;

use super::transport::AxumTransport;
use super::unix::{bind_unix_listener, request_unix_credentials, UnixPeer};
use crate::application::dispatch::dispatch;
use crate::application::http::QueryArgs;
use crate::application::{
    run_connection, run_heartbeat, AuthCheck, ExposedRegistry, HttpExposed, InboundFrame,
    RegistryError, SessionHub, WsRoutes,
};
use crate::domain::validators::valid_bool;
use crate::domain::{ApiError, ServerSettings, SessionContext, TransportError, WsProtocol};

/// State shared by every WebSocket connection.
struct WsEndpoint {
    hub: Arc<SessionHub>,
    routes: Arc<WsRoutes>,
    heartbeat: Option<Duration>,
}

/// The daemon's HTTP server.
pub struct HttpServer {
    settings: ServerSettings,
    http: Vec<HttpExposed>,
    hub: Arc<SessionHub>,
    auth: Arc<dyn AuthCheck>,
}

impl HttpServer {
    /// Adds the WebSocket endpoint to `registry` and freezes it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHttpRoute`] if a component already
    /// claimed `GET <ws_path>`.
    pub fn new(
        settings: ServerSettings,
        mut registry: ExposedRegistry,
        hub: Arc<SessionHub>,
        auth: Arc<dyn AuthCheck>,
    ) -> Result<Self, RegistryError> {
        let endpoint = Arc::new(WsEndpoint {
            hub: Arc::clone(&hub),
            routes: Arc::new(registry.ws_routes().clone()),
            heartbeat: settings.heartbeat_interval(),
        });
        registry.add_http(HttpExposed::new(
            Method::GET,
            &settings.ws_path,
            move |request| upgrade(Arc::clone(&endpoint), request),
        ))?;
        let (http, _) = registry.into_parts();

        Ok(Self {
            settings,
            http,
            hub,
            auth,
        })
    }

    /// Builds the router: one method router per path, each method wrapped by
    /// the dispatch wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedMethod`] for methods axum cannot route.
    pub fn router(&self) -> Result<Router, RegistryError> {
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for exposed in &self.http {
            let filter = MethodFilter::try_from(exposed.route.method.clone()).map_err(|_| {
                RegistryError::UnsupportedMethod {
                    method: exposed.route.method.clone(),
                    path: exposed.route.path.clone(),
                }
            })?;

            let route = Arc::new(exposed.route.clone());
            let handler = exposed.handler.clone();
            let auth = Arc::clone(&self.auth);
            let wrapper = move |request: Request| {
                let route = Arc::clone(&route);
                let handler = handler.clone();
                let auth = Arc::clone(&auth);
                async move { dispatch(&route, &handler, auth.as_ref(), request).await }
            };

            let path = exposed.route.path.clone();
            let method_router = by_path.remove(&path).unwrap_or_else(MethodRouter::new);
            by_path.insert(path, method_router.on(filter, wrapper));
        }

        Ok(by_path
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            }))
    }

    /// The router behind path normalization: what [`HttpServer::run`] serves.
    ///
    /// # Errors
    ///
    /// See [`HttpServer::router`].
    pub fn app(&self) -> Result<NormalizePath<Router>, RegistryError> {
        Ok(NormalizePathLayer::trim_trailing_slash().layer(self.router()?))
    }

    /// Serves until `shutdown` resolves, then closes every session.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or the server fails.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.app()?;

        let listener = bind_unix_listener(
            &self.settings.unix_path,
            self.settings.unix_rm,
            self.settings.unix_mode,
        )?;

        let hub = Arc::clone(&self.hub);
        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<UnixPeer>(app),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down: closing client sessions");
            if hub.close_all().await {
                info!("Disconnected all clients");
            }
        })
        .await
        .context("HTTP server failed")?;

        info!("HTTP server stopped");
        Ok(())
    }
}

// ── WebSocket endpoint ────────────────────────────────────────────────────────

/// Handles `GET <ws_path>`: parses `legacy`, upgrades, and hands the socket
/// to [`serve_socket`].
async fn upgrade(endpoint: Arc<WsEndpoint>, request: Request) -> Result<Response, ApiError> {
    let (mut parts, _body) = request.into_parts();

    let args = QueryArgs::from_uri(&parts.uri)?;
    let legacy = match args.get("legacy") {
        Some(value) => valid_bool(&value)?,
        None => true,
    };

    let ws = WebSocketUpgrade::from_request_parts(&mut parts, &())
        .await
        .map_err(|rejection| ApiError::Http {
            status: rejection.status().as_u16(),
            msg: rejection.body_text(),
        })?;

    let mut context = SessionContext::new();
    if let Some(credentials) = request_unix_credentials(&parts) {
        context.insert(
            "unix_credentials".to_string(),
            serde_json::to_value(credentials).unwrap_or(Value::Null),
        );
    }
    let protocol = WsProtocol::from_legacy_flag(legacy);

    Ok(ws
        .on_upgrade(move |socket| serve_socket(endpoint, socket, protocol, context))
        .into_response())
}

async fn serve_socket(
    endpoint: Arc<WsEndpoint>,
    socket: WebSocket,
    protocol: WsProtocol,
    context: SessionContext,
) {
    let (sink, stream) = socket.split();
    let transport = Arc::new(AxumTransport::new(sink));
    let session = endpoint.hub.open_session(transport, protocol, context).await;

    // The heartbeat ends on its own once the session is closed.
    if let Some(period) = endpoint.heartbeat {
        tokio::spawn(run_heartbeat(
            Arc::clone(&endpoint.hub),
            Arc::clone(&session),
            period,
        ));
    }

    let frames = stream.map(|message| {
        message
            .map(InboundFrame::from)
            .map_err(|e| TransportError::Io(e.to_string()))
    });
    run_connection(
        Arc::clone(&endpoint.hub),
        Arc::clone(&endpoint.routes),
        session,
        frames,
    )
    .await;
}
