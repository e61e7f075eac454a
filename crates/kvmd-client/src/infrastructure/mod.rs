//! Infrastructure layer for the client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `kvmd_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`ws_client`** – connects to the daemon's unix socket, performs the
//!   WebSocket upgrade and runs the read/write loop for one connection.

pub mod ws_client;

pub use ws_client::{ClientError, ClientWs, KvmdClient, DEFAULT_UNIX_PATH};
