//! Credentials of the process on the other end of the unix socket.

use serde::Serialize;

/// Peer process credentials read with `SO_PEERCRED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnixCredentials {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
}

impl UnixCredentials {
    /// Builds credentials from raw values.
    ///
    /// Returns `None` when the kernel did not report a real process
    /// (`pid <= 0`), which happens for peers in another PID namespace.
    pub fn from_raw(pid: Option<i32>, uid: u32, gid: u32) -> Option<Self> {
        let pid = u32::try_from(pid?).ok().filter(|pid| *pid > 0)?;
        Some(Self { pid, uid, gid })
    }
}
