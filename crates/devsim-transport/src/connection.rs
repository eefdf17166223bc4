use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Default bound on a TCP connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// A connected gateway socket over Unix or TCP.
///
/// Connections returned by [`connect`] are already in non-blocking mode, so
/// reads and writes surface `WouldBlock` instead of stalling the caller.
pub struct Connection {
    inner: ConnectionInner,
    label: String,
}

enum ConnectionInner {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ConnectionInner::Unix(stream) => stream.read(buf),
            ConnectionInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ConnectionInner::Unix(stream) => stream.write(buf),
            ConnectionInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            ConnectionInner::Unix(stream) => stream.flush(),
            ConnectionInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            ConnectionInner::Unix(stream) => stream.as_raw_fd(),
            ConnectionInner::Tcp(stream) => stream.as_raw_fd(),
        }
    }
}

impl Connection {
    /// Wrap an already connected Unix stream (e.g. one half of a socket pair).
    pub fn from_unix(stream: UnixStream, label: impl Into<String>) -> Self {
        Self {
            inner: ConnectionInner::Unix(stream),
            label: label.into(),
        }
    }

    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream, label: impl Into<String>) -> Self {
        Self {
            inner: ConnectionInner::Tcp(stream),
            label: label.into(),
        }
    }

    /// Human-readable endpoint label for diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Switch the underlying socket between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            ConnectionInner::Unix(stream) => stream.set_nonblocking(nonblocking)?,
            ConnectionInner::Tcp(stream) => stream.set_nonblocking(nonblocking)?,
        }
        Ok(())
    }

    /// Shut down both directions of the socket.
    ///
    /// A socket the peer already tore down is not an error.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            ConnectionInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            ConnectionInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            ConnectionInner::Unix(_) => "unix-domain-socket",
            ConnectionInner::Tcp(_) => "tcp",
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("type", &self.transport_name())
            .field("endpoint", &self.label)
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

/// Connect to a gateway endpoint (blocking), then switch the socket to
/// non-blocking mode.
///
/// TCP attempts are bounded by `timeout` per resolved address; every failure
/// (resolution, refusal, timeout) is returned synchronously.
pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Connection> {
    let connection = match endpoint {
        Endpoint::Unix(path) => connect_unix(path, endpoint)?,
        Endpoint::Tcp { host, port } => connect_tcp(host, *port, timeout, endpoint)?,
    };
    connection.set_nonblocking(true)?;
    debug!(%endpoint, "connected to gateway");
    Ok(connection)
}

fn connect_unix(path: &Path, endpoint: &Endpoint) -> Result<Connection> {
    let path_bytes = path.as_os_str().len();
    if path_bytes >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len: path_bytes,
            max: MAX_PATH_LEN,
        });
    }

    let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
        endpoint: endpoint.to_string(),
        source: e,
    })?;
    Ok(Connection::from_unix(stream, endpoint.to_string()))
}

fn connect_tcp(host: &str, port: u16, timeout: Duration, endpoint: &Endpoint) -> Result<Connection> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve {
            host: host.to_string(),
            source: e,
        })?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                if let Err(err) = stream.set_nodelay(true) {
                    warn!(%addr, error = %err, "failed to disable nagle");
                }
                return Ok(Connection::from_tcp(stream, endpoint.to_string()));
            }
            Err(err) => {
                debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(source) => Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        }),
        None => Err(TransportError::NoAddresses {
            host: host.to_string(),
        }),
    }
}
