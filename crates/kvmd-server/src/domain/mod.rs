//! Domain layer for kvmd-server.
//!
//! Types here describe *what* the daemon talks about (configuration, errors,
//! sessions, HID state) without performing any I/O.

pub mod config;
pub mod errors;
pub mod hid;
pub mod peer;
pub mod session;
pub mod validators;

pub use config::{AppConfig, ConfigError, HidConfig, ServerSettings};
pub use errors::{ApiError, ValidatorError};
pub use hid::{HidBackend, HidError, HidState};
pub use peer::UnixCredentials;
pub use session::{SessionContext, TransportError, WsFrame, WsProtocol, WsSession, WsTransport};
