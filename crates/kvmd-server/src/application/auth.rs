//! Pluggable authentication hook run by the dispatch wrapper.
//!
//! The daemon core does not implement any authentication scheme itself.  It
//! calls the configured [`AuthCheck`] for every route with
//! `auth_required = true` and records the identity it returns in the request
//! span.

use async_trait::async_trait;
use axum::http::request::Parts;

use super::exposed::HttpRoute;
use crate::domain::ApiError;

/// Decides whether a request may reach its handler.
#[async_trait]
pub trait AuthCheck: Send + Sync {
    /// Returns an identity string for logging, or `None` if anonymous.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] or [`ApiError::Forbidden`] to reject.
    async fn check(&self, route: &HttpRoute, parts: &Parts) -> Result<Option<String>, ApiError>;
}

/// Accepts every request.  Used when no auth backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AuthCheck for AllowAll {
    async fn check(&self, _route: &HttpRoute, _parts: &Parts) -> Result<Option<String>, ApiError> {
        Ok(None)
    }
}
