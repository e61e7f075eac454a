//! Infrastructure layer for kvmd-server.
//!
//! Everything that touches the operating system or a wire protocol library
//! lives here.
//!
//! # Responsibilities
//!
//! - Binding the unix socket and reading peer credentials
//! - Building the axum router from the registry and serving it
//! - Performing the WebSocket upgrade and adapting the socket to `WsTransport`
//! - Sending heartbeat pings
//! - The in-memory HID backend
//!
//! # What does NOT belong here?
//!
//! - Deciding how requests or frames are handled (application layer)
//! - Configuration schema and error taxonomy (domain layer)

pub mod dummy_hid;
pub mod server;
pub mod transport;
pub mod unix;

pub use dummy_hid::DummyHid;
pub use server::HttpServer;
pub use transport::AxumTransport;
pub use unix::{bind_unix_listener, request_unix_credentials, UnixPeer};
