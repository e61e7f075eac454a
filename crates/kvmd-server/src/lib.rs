//! kvmd-server library crate.
//!
//! This crate is the transport core of the kvmd remote-hardware-control
//! daemon: an HTTP/WebSocket server listening on a unix socket that
//!
//! - dispatches HTTP requests to handlers that components *expose* by
//!   declaring `(method, path, auth flags, handler)` tuples, and
//! - keeps a hub of live WebSocket sessions that stream HID state to clients
//!   and accept JSON text events and low-latency binary input events.
//!
//! # Architecture
//!
//! ```text
//! client (HTTP / WebSocket over unix socket)
//!         ↕
//! [kvmd-server]
//!   ├── domain/           Config, ApiError taxonomy, validators, session and HID traits
//!   ├── application/      Route registry, dispatch wrapper, session hub,
//!   │                     connection loop, HID service, exposed API components
//!   └── infrastructure/
//!         ├── server/     axum router, upgrade endpoint, heartbeat, graceful shutdown
//!         ├── unix/       unix listener and peer credentials
//!         ├── transport/  axum WebSocket adapter
//!         └── dummy_hid/  in-memory HID backend
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.  It declares the capability traits
//!   ([`domain::session::WsTransport`], [`domain::hid::HidBackend`]) the
//!   other layers are written against.
//! - `application` depends on `domain` and `kvmd-core`; its async code never
//!   touches a socket directly.
//! - `infrastructure` depends on all other layers plus `axum` and `tokio::net`.

/// Domain layer: pure types and capability traits.
pub mod domain;

/// Application layer: registry, dispatch, hub and exposed components.
pub mod application;

/// Infrastructure layer: unix-socket HTTP server and concrete backends.
pub mod infrastructure;
