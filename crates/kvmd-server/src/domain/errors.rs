//! Error taxonomy surfaced to API clients.
//!
//! Every handler returns `Result<_, ApiError>`.  The dispatch wrapper turns
//! the error into the JSON envelope
//!
//! ```text
//! {"ok": false, "result": {"error": "<kind>", "error_msg": "<message>"}}
//! ```
//!
//! with the status from [`ApiError::status`].  Only
//! [`ApiError::Internal`] escapes the envelope: it becomes a bare 500.

use thiserror::Error;

/// An API-level failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The resource is busy with another operation (409).
    #[error("{0}")]
    Busy(String),

    /// A request argument failed validation (400).
    #[error("{0}")]
    InvalidInput(String),

    /// The operation was understood but could not be carried out (400).
    #[error("{0}")]
    Operation(String),

    /// Authentication is required or failed (401).
    #[error("Unauthorized")]
    Unauthorized,

    /// The caller is authenticated but not allowed (403).
    #[error("Forbidden")]
    Forbidden,

    /// The service is temporarily unavailable (503).
    #[error("Service Unavailable")]
    Unavailable,

    /// Any other HTTP-level failure with an explicit status.
    #[error("{msg}")]
    Http { status: u16, msg: String },

    /// An unexpected failure.  Rendered as a bare 500 and logged.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// The error kind string placed in the envelope's `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Busy(_) => "IsBusyError",
            Self::InvalidInput(_) => "ValidatorError",
            Self::Operation(_) => "OperationError",
            Self::Unauthorized => "UnauthorizedError",
            Self::Forbidden => "ForbiddenError",
            Self::Unavailable => "UnavailableError",
            Self::Http { .. } => "HttpError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// HTTP status code for the error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Busy(_) => 409,
            Self::InvalidInput(_) | Self::Operation(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::Unavailable => 503,
            Self::Http { status, .. } => *status,
            Self::Internal(_) => 500,
        }
    }

    /// `true` for plain HTTP errors, which are expected and not logged.
    pub fn is_http_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Forbidden | Self::Unavailable | Self::Http { .. }
        )
    }
}

/// A request argument did not pass validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidatorError(pub String);

impl From<ValidatorError> for ApiError {
    fn from(err: ValidatorError) -> Self {
        Self::InvalidInput(err.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
