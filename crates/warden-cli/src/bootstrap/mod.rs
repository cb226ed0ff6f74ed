//! Lazy daemon start-up.
//!
//! [`ensure_daemon`] probes the configured endpoint briefly. When nothing is
//! listening it launches the daemon once and races the child's exit against
//! a short start-up window: a child that is still alive when the window
//! closes is taken as a successful start, while any exit inside the window
//! is a failure. No reachability re-check follows the window; the next dial
//! reports a daemon that survived the window but never bound its endpoint.

mod launcher;

use std::io::{self, Write};
use std::process::ExitStatus;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use warden_config::{HomeError, Settings};

use crate::transport::{Connection, DialError, dial};

pub(crate) use launcher::SelfLauncher;

pub(crate) const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Connect timeout for the initial reachability probe.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_millis(100);
/// How long a freshly launched daemon must survive to count as started.
pub(crate) const STARTUP_WINDOW: Duration = Duration::from_millis(500);

/// Starts a daemon process serving the configured endpoint.
pub(crate) trait DaemonLauncher {
    /// Launches the daemon in the background.
    fn launch(&self, settings: &Settings) -> Result<Box<dyn SpawnedDaemon>, BootstrapError>;
}

/// A launched daemon whose exit can be awaited.
pub(crate) trait SpawnedDaemon: Send {
    /// Blocks until the process exits.
    fn wait(self: Box<Self>) -> io::Result<ExitStatus>;
}

/// Errors raised while making sure a daemon is reachable.
#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error("failed to probe daemon: {0}")]
    Probe(#[source] DialError),
    #[error(transparent)]
    Home(#[from] HomeError),
    #[error("failed to open daemon log {path}: {source}")]
    DaemonLog {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn daemon '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("daemon exited during start-up with {status}; see {log}")]
    Exited { status: ExitStatus, log: String },
    #[error("daemon exited during start-up without an error status; see {log}")]
    ExitedEarly { log: String },
    #[error("failed to monitor daemon start-up: {0}")]
    Wait(#[source] io::Error),
}

/// How the daemon came to be reachable.
#[derive(Debug)]
pub(crate) enum Bootstrap {
    /// The probe connected; the probe connection is handed over for reuse.
    AlreadyRunning(Connection),
    /// A daemon was launched and survived the start-up window.
    Started,
}

/// Makes sure a daemon is serving `settings.endpoint()`, starting one when
/// the probe finds nothing listening. Launches at most once.
pub(crate) fn ensure_daemon<L, E>(
    settings: &Settings,
    launcher: &L,
    stderr: &mut E,
) -> Result<Bootstrap, BootstrapError>
where
    L: DaemonLauncher + ?Sized,
    E: Write,
{
    let endpoint = settings.endpoint();
    match dial(endpoint, PROBE_TIMEOUT) {
        Ok(connection) => {
            debug!(target: BOOTSTRAP_TARGET, %endpoint, "daemon already running");
            return Ok(Bootstrap::AlreadyRunning(connection));
        }
        Err(error) if error.is_not_running() => {
            debug!(target: BOOTSTRAP_TARGET, %endpoint, %error, "daemon not reachable");
        }
        Err(error) => return Err(BootstrapError::Probe(error)),
    }

    let child = launcher.launch(settings)?;
    let log = settings.paths().daemon_log_path().to_string();
    race_startup(child, STARTUP_WINDOW, log)?;
    info!(target: BOOTSTRAP_TARGET, %endpoint, "daemon started");
    // A closed stderr must not fail the command.
    let _ = writeln!(stderr, "daemon started ({endpoint})");
    Ok(Bootstrap::Started)
}

enum Race {
    Exited(io::Result<ExitStatus>),
    Elapsed,
}

/// Waits for whichever comes first: the child exiting or `window` elapsing.
/// The losing thread is left to finish on its own.
fn race_startup(
    child: Box<dyn SpawnedDaemon>,
    window: Duration,
    log: String,
) -> Result<(), BootstrapError> {
    let (sender, receiver) = mpsc::channel();
    let waiter = sender.clone();
    thread::spawn(move || {
        let _ = waiter.send(Race::Exited(child.wait()));
    });
    thread::spawn(move || {
        thread::sleep(window);
        let _ = sender.send(Race::Elapsed);
    });

    match receiver.recv() {
        Ok(Race::Elapsed) | Err(mpsc::RecvError) => Ok(()),
        Ok(Race::Exited(Ok(status))) if status.success() => {
            Err(BootstrapError::ExitedEarly { log })
        }
        Ok(Race::Exited(Ok(status))) => Err(BootstrapError::Exited { status, log }),
        Ok(Race::Exited(Err(source))) => Err(BootstrapError::Wait(source)),
    }
}
