//! Liveness endpoints: WebSocket `ping` and `GET /info`.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use kvmd_core::EventPayload;
use serde_json::json;
use tracing::debug;

use super::exposed::{Exposed, HttpExposed, WsExposed};
use super::http::make_json_response;
use super::hub::SessionHub;

/// Daemon version reported by `GET /info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct SystemApi {
    hub: Arc<SessionHub>,
}

impl SystemApi {
    pub fn new(hub: Arc<SessionHub>) -> Self {
        Self { hub }
    }
}

impl Exposed for SystemApi {
    fn exposed_http(&self) -> Vec<HttpExposed> {
        let hub = Arc::clone(&self.hub);
        vec![HttpExposed::new(Method::GET, "/info", move |_request| {
            let hub = Arc::clone(&hub);
            async move {
                let clients = hub.len().await;
                Ok(make_json_response(
                    json!({ "version": VERSION, "clients": clients }),
                    StatusCode::OK,
                ))
            }
        })
        .auth_required(false)]
    }

    fn exposed_ws(&self) -> Vec<WsExposed> {
        vec![WsExposed::text("ping", |session, _event| async move {
            if let Err(e) = session.send_event("pong", &EventPayload::new()).await {
                debug!(session = %session.id(), "pong not delivered: {e}");
            }
            Ok(())
        })]
    }
}
