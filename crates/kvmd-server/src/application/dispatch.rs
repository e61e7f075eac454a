//! Uniform wrapper around every exposed HTTP handler.
//!
//! For each request the wrapper
//!
//! 1. opens an `http` tracing span carrying method, path and (once known)
//!    the authenticated identity,
//! 2. runs the [`AuthCheck`] when the route requires it,
//! 3. awaits the handler and passes a successful response through untouched,
//! 4. renders any [`ApiError`] as the JSON error envelope (or a bare 500 for
//!    [`ApiError::Internal`]).

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info_span, Instrument, Span};

use super::auth::AuthCheck;
use super::exposed::{HttpHandler, HttpRoute};
use crate::domain::ApiError;

/// Runs one request through auth and the handler.
pub async fn dispatch(
    route: &HttpRoute,
    handler: &HttpHandler,
    auth: &dyn AuthCheck,
    request: Request,
) -> Response {
    let span = info_span!(
        "http",
        method = %route.method,
        path = %route.path,
        auth_info = tracing::field::Empty,
    );
    run(route, handler, auth, request).instrument(span).await
}

async fn run(
    route: &HttpRoute,
    handler: &HttpHandler,
    auth: &dyn AuthCheck,
    request: Request,
) -> Response {
    let result = match authorize(route, auth, request).await {
        Ok(request) => handler(request).await,
        Err(err) => Err(err),
    };

    let response = match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };
    debug!(status = response.status().as_u16(), "request handled");
    response
}

async fn authorize(
    route: &HttpRoute,
    auth: &dyn AuthCheck,
    request: Request,
) -> Result<Request, ApiError> {
    if !route.auth_required {
        return Ok(request);
    }
    let (parts, body) = request.into_parts();
    if let Some(identity) = auth.check(route, &parts).await? {
        Span::current().record("auth_info", identity.as_str());
    }
    Ok(Request::from_parts(parts, body))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
