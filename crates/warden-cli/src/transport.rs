//! Socket transport helpers for the warden CLI.
//!
//! [`dial`] hides the address family behind a uniform [`Connection`] so the
//! RPC layer never needs to know whether it talks over a Unix domain socket
//! or TCP. Both transports honour the same connect timeout and report an
//! expired timeout as [`io::ErrorKind::TimedOut`].

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use warden_config::DaemonEndpoint;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

/// Timeout for dialing a daemon that is expected to be up.
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// An open connection to the daemon.
#[derive(Debug)]
pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    /// Clones the underlying socket so reads and writes can be buffered
    /// independently.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Errors raised while dialing the daemon.
#[derive(Debug, Error)]
pub(crate) enum DialError {
    #[error("failed to resolve daemon address {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {endpoint}")]
    UnsupportedUnixTransport { endpoint: String },
}

impl DialError {
    /// Whether the failure means nothing is listening at the endpoint, as
    /// opposed to the endpoint being unusable.
    ///
    /// Refused connections, missing socket files, unavailable addresses and
    /// expired connect timeouts all qualify.
    pub(crate) fn is_not_running(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::AddrNotAvailable
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Opens a connection to `endpoint`, giving up after `timeout`.
pub(crate) fn dial(endpoint: &DaemonEndpoint, timeout: Duration) -> Result<Connection, DialError> {
    match endpoint {
        DaemonEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port).map_err(|source| DialError::Resolve {
                endpoint: endpoint.to_string(),
                source,
            })?;
            TcpStream::connect_timeout(&address, timeout)
                .map(Connection::Tcp)
                .map_err(|source| DialError::Connect {
                    endpoint: endpoint.to_string(),
                    source: normalise_timeout(source),
                })
        }
        DaemonEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), timeout).map_err(|source| DialError::Connect {
                    endpoint: endpoint.to_string(),
                    source: normalise_timeout(source),
                })
            }

            #[cfg(not(unix))]
            {
                let _ = (path, timeout);
                Err(DialError::UnsupportedUnixTransport {
                    endpoint: endpoint.to_string(),
                })
            }
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

/// Some platforms report an expired non-blocking connect as `WouldBlock`.
fn normalise_timeout(error: io::Error) -> io::Error {
    if error.kind() == io::ErrorKind::WouldBlock {
        io::Error::new(io::ErrorKind::TimedOut, error)
    } else {
        error
    }
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream = UnixStream::from(std::os::fd::OwnedFd::from(socket));
    Ok(Connection::Unix(stream))
}
