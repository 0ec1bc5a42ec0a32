//! The listening socket.
//!
//! One Unix stream socket under `$XDG_RUNTIME_DIR`, unlinked before
//! bind and cleaned up on drop. Filesystem permissions are the only
//! gate; connections are accepted without a credentials check.

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub struct ListeningSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl ListeningSocket {
    /// Bind `$XDG_RUNTIME_DIR/<name>`, replacing any stale socket file.
    pub fn bind(runtime_dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = runtime_dir.as_ref().join(name);

        let _ = std::fs::remove_file(&path);

        tracing::info!("binding socket: {}", path.display());
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind socket at {}", path.display()))?;
        listener
            .set_nonblocking(true)
            .context("failed to make listening socket non-blocking")?;

        Ok(ListeningSocket { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Accept one pending connection; None when nothing is queued.
    pub fn accept(&self) -> std::io::Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _addr)) => Ok(Some(stream)),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for ListeningSocket {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to remove socket file {}: {}", self.path.display(), err);
        } else {
            tracing::debug!("removed socket file: {}", self.path.display());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_runtime_dir() -> PathBuf {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("tioga-test-{}-{}", std::process::id(), timestamp));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_bind_creates_socket_file() {
        let dir = test_runtime_dir();
        let socket = ListeningSocket::bind(&dir, "wayland-test").unwrap();
        assert!(dir.join("wayland-test").exists());
        drop(socket);
        assert!(!dir.join("wayland-test").exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = test_runtime_dir();
        let first = ListeningSocket::bind(&dir, "wayland-test");
        assert!(first.is_ok());
        let second = ListeningSocket::bind(&dir, "wayland-test");
        assert!(second.is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_accept_without_pending_returns_none() {
        let dir = test_runtime_dir();
        let socket = ListeningSocket::bind(&dir, "wayland-test").unwrap();
        assert!(socket.accept().unwrap().is_none());

        UnixStream::connect(socket.path()).unwrap();
        let accepted = socket.accept().unwrap();
        assert!(accepted.is_some());
        let _ = std::fs::remove_dir_all(dir);
    }
}
