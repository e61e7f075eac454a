//! Unix-socket listener and peer credentials.
//!
//! The daemon only listens on a unix socket; a front-end proxy (nginx)
//! terminates TLS and forwards requests.  Local tools can also connect
//! directly, and for them the kernel reports the peer's pid/uid/gid through
//! `SO_PEERCRED`.  Those credentials are attached to every request as
//! [`ConnectInfo<UnixPeer>`] and copied into WebSocket session contexts.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::Context;
use axum::extract::connect_info::{ConnectInfo, Connected};
use axum::http::request::Parts;
use axum::serve::IncomingStream;
use tokio::net::UnixListener;
use tracing::{debug, info};

use crate::domain::UnixCredentials;

/// Connection info recorded for each accepted unix-socket connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnixPeer {
    pub credentials: Option<UnixCredentials>,
}

impl Connected<IncomingStream<'_, UnixListener>> for UnixPeer {
    fn connect_info(stream: IncomingStream<'_, UnixListener>) -> Self {
        let credentials = match stream.io().peer_cred() {
            Ok(cred) => UnixCredentials::from_raw(cred.pid(), cred.uid(), cred.gid()),
            Err(e) => {
                debug!("SO_PEERCRED unavailable: {e}");
                None
            }
        };
        Self { credentials }
    }
}

/// Peer credentials of the connection a request arrived on, if known.
pub fn request_unix_credentials(parts: &Parts) -> Option<UnixCredentials> {
    parts
        .extensions
        .get::<ConnectInfo<UnixPeer>>()
        .and_then(|ConnectInfo(peer)| peer.credentials)
}

/// Binds the listening socket.
///
/// With `remove_existing` a stale socket file left by a previous run is
/// deleted first.  A non-zero `mode` is applied to the socket file after
/// binding.
///
/// # Errors
///
/// Returns an error if the stale file cannot be removed, the socket cannot
/// be bound, or its permissions cannot be changed.
pub fn bind_unix_listener(path: &Path, remove_existing: bool, mode: u32) -> anyhow::Result<UnixListener> {
    if remove_existing && path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
        debug!("removed stale socket {}", path.display());
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind unix socket {}", path.display()))?;

    if mode != 0 {
        std::fs::set_permissions(path, Permissions::from_mode(mode))
            .with_context(|| format!("failed to chmod {:o} {}", mode, path.display()))?;
    }

    info!("Listening on unix socket {}", path.display());
    Ok(listener)
}
