//! Application layer for kvmd-server.
//!
//! The application layer decides *what* happens to a request or a frame; the
//! infrastructure layer only moves bytes.
//!
//! # Responsibilities
//!
//! - Collecting exposed routes into the registry and rejecting duplicates
//! - Wrapping every HTTP handler with auth, logging and error rendering
//! - Tracking live WebSocket sessions and broadcasting to them
//! - Running the per-connection receive loop
//! - The HID and system API components
//!
//! # What does NOT belong here?
//!
//! - Binding sockets or reading peer credentials (infrastructure)
//! - The axum router and WebSocket upgrade (infrastructure)

pub mod auth;
pub mod connection;
pub mod dispatch;
pub mod exposed;
pub mod hid_api;
pub mod hid_service;
pub mod http;
pub mod hub;
pub mod registry;
pub mod system_api;

pub use auth::{AllowAll, AuthCheck};
pub use connection::{run_connection, run_heartbeat, InboundFrame};
pub use exposed::{Exposed, HttpExposed, HttpRoute, WsEventKey, WsExposed};
pub use hid_api::HidApi;
pub use hid_service::{HidService, HidSnapshot};
pub use hub::{NoopHooks, SessionHooks, SessionHub};
pub use registry::{ExposedRegistry, RegistryError, WsRoutes};
pub use system_api::SystemApi;
