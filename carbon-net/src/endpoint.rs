//! Transport used by the connector. The original speaks UNIX-domain sockets
//! almost everywhere (the remote-event service, shell-exec); `Tcp` is kept
//! alongside it since the connector itself has no reason to be domain-socket
//! only, and the worker-pool/`NetClient` split is exercised more easily
//! against a loopback TCP listener in tests.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use carbon_core::{CarbonError, CarbonErrorKind, CarbonResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// A connected transport, read/write timeouts already in the caller's hands.
pub enum Conn {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Conn {
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match self {
            Conn::Tcp(s) => s.set_write_timeout(timeout),
            Conn::Unix(s) => s.set_write_timeout(timeout),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match self {
            Conn::Tcp(s) => s.set_read_timeout(timeout),
            Conn::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    pub fn shutdown_write(&self) -> std::io::Result<()> {
        match self {
            Conn::Tcp(s) => s.shutdown(std::net::Shutdown::Write),
            Conn::Unix(s) => s.shutdown(std::net::Shutdown::Write),
        }
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Conn::Tcp(s) => s.read(buf),
            Conn::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Conn::Tcp(s) => s.write(buf),
            Conn::Unix(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Conn::Tcp(s) => s.flush(),
            Conn::Unix(s) => s.flush(),
        }
    }
}

/// Connects to `endpoint`, bounding TCP's handshake by `timeout`. UNIX-domain
/// connects are local and effectively instantaneous, so `timeout` only
/// applies to the `Tcp` variant, matching `TcpStream::connect_timeout`'s own
/// contract.
pub fn connect(endpoint: &Endpoint, timeout: Duration) -> CarbonResult<Conn> {
    match endpoint {
        Endpoint::Tcp(addr) => TcpStream::connect_timeout(addr, timeout)
            .map(Conn::Tcp)
            .map_err(|e| CarbonError::io(format!("connect to {endpoint} failed"), e)),
        Endpoint::Unix(path) => UnixStream::connect(path)
            .map(Conn::Unix)
            .map_err(|e| CarbonError::io(format!("connect to {endpoint} failed"), e)),
    }
}

/// Ensures `socket_path`'s parent directory exists and no stale socket file
/// sits at `socket_path`, so a following `UnixListener::bind` won't fail with
/// `AddrInUse`. Ported from the source's `prepareSocket`/`preparePath`: make
/// the root dir, unlink the old socket, then poll up to 10x100ms for the
/// path to actually disappear before giving up — a bounded wait rather than
/// the unbounded one the open question calls out.
pub fn prepare_unix_socket_path(socket_path: &std::path::Path) -> CarbonResult<()> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CarbonError::io(format!("failed to create socket root {}", parent.display()), e))?;
    }
    if let Err(e) = std::fs::remove_file(socket_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(CarbonError::io(format!("failed to remove stale socket {}", socket_path.display()), e));
        }
    }

    let mut attempts = 0;
    while socket_path.exists() && attempts < 10 {
        std::thread::sleep(Duration::from_millis(100));
        attempts += 1;
    }
    if socket_path.exists() {
        return Err(CarbonError::new(
            CarbonErrorKind::AlreadyExists,
            format!("socket path {} still present after unlink", socket_path.display()),
        ));
    }
    Ok(())
}

/// Reads until EOF or `max_len`, whichever comes first. One connector
/// transaction is one request and (optionally) one reply, so the peer
/// closing its write half is the natural end-of-reply signal.
pub fn read_capped(conn: &mut Conn, max_len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = conn.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let take = n.min(max_len.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..take]);
        if buf.len() >= max_len {
            break;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepares_a_fresh_path_under_a_new_root() {
        let dir = std::env::temp_dir().join(format!("carbon-net-test-{}", std::process::id()));
        let socket = dir.join("some.rid");
        let _ = std::fs::remove_dir_all(&dir);

        prepare_unix_socket_path(&socket).unwrap();
        assert!(dir.is_dir());
        assert!(!socket.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unlinks_a_stale_socket_file() {
        let dir = std::env::temp_dir().join(format!("carbon-net-test-stale-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let socket = dir.join("stale.rid");
        let listener = UnixStream::pair().unwrap(); // any unix fd to prove the path can hold a real socket
        drop(listener);
        std::fs::write(&socket, b"not a socket, just occupying the path").unwrap();

        prepare_unix_socket_path(&socket).unwrap();
        assert!(!socket.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
