//! Listener implementation for daemon transport sockets.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use warden_config::DaemonEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to the daemon endpoint but not yet accepting.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: DaemonEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    pub(crate) fn bind(endpoint: &DaemonEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            DaemonEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            DaemonEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
            #[cfg(not(unix))]
            DaemonEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Reports the bound TCP address; Unix listeners have none worth sharing.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts the accept loop on a background thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        let nonblocking = match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        };
        if let Err(source) = nonblocking {
            #[cfg(unix)]
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &shutdown_flag, &handler));
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop after its current iteration.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit. The Unix socket file is gone once
    /// this returns.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let handler = Arc::clone(handler);
                thread::spawn(move || handler.handle(stream));
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    #[cfg(unix)]
    cleanup_unix_socket(&listener.endpoint);
    debug!(target: LISTENER_TARGET, "socket listener stopped");
}

fn accept_connection(listener: &SocketListener) -> Result<Option<ConnectionStream>, io::Error> {
    let accepted = match &listener.listener {
        ListenerKind::Tcp(tcp) => tcp.accept().and_then(|(stream, _)| {
            stream.set_nonblocking(false)?;
            Ok(ConnectionStream::Tcp(stream))
        }),
        #[cfg(unix)]
        ListenerKind::Unix(unix) => unix.accept().and_then(|(stream, _)| {
            stream.set_nonblocking(false)?;
            Ok(ConnectionStream::Unix(stream))
        }),
    };
    match accepted {
        Ok(stream) => Ok(Some(stream)),
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Binds a Unix listener, replacing a stale socket file but refusing one that
/// still answers connections.
#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if !metadata.file_type().is_socket() {
                return Err(ListenerError::UnixNotSocket { path: display() });
            }
            match UnixStream::connect(path) {
                Ok(_live) => return Err(ListenerError::UnixInUse { path: display() }),
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                    ) =>
                {
                    info!(
                        target: LISTENER_TARGET,
                        path = %path.display(),
                        "removing stale unix socket"
                    );
                    fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                        path: display(),
                        source,
                    })?;
                }
                Err(source) => {
                    return Err(ListenerError::UnixConnect {
                        path: display(),
                        source,
                    });
                }
            }
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: display(),
                source,
            });
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: display(),
        source,
    })
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &DaemonEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
