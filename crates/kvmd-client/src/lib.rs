//! kvmd-client library entry point.
//!
//! A small client for the daemon's WebSocket API, used by the `kvmd-client`
//! binary and by other programs that drive a kvmd instance over its unix
//! socket.
//!
//! # How a client session works
//!
//! 1. [`KvmdClient::ws`](infrastructure::ws_client::KvmdClient::ws) connects
//!    to the unix socket and upgrades `GET /ws?legacy=0`, sending the
//!    `X-KVMD-User` / `X-KVMD-Passwd` headers.
//! 2. The returned [`ClientWs`](infrastructure::ws_client::ClientWs) hands
//!    out cloneable [`ClientWriter`](application::session::ClientWriter)s.
//!    Writers only enqueue: nothing touches the socket except the session.
//! 3. `ClientWs::communicate` owns the socket for its whole lifetime.  It
//!    waits on the next inbound frame and the next queued outbound item at
//!    the same time, handles whichever is ready first, and always closes the
//!    socket on the way out.

/// Application layer: events, the outbound queue and its writers.
pub mod application;

/// Infrastructure layer: the unix-socket WebSocket connection.
pub mod infrastructure;
