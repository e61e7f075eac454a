//! Application layer for the client.
//!
//! - **`session`** – the per-connection FIFO of outbound messages, the
//!   [`ClientWriter`] handle that feeds it, and the [`ClientEvent`]s read
//!   back from the daemon.

pub mod session;

pub use session::{ClientEvent, ClientWriter, OutboundQueue, Queued, WriterError};
