//! Shutdown notification from termination signals and the `shutdown` call.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;

/// Why the daemon is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// A client issued the `shutdown` call.
    Request,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(formatter, "signal {signal}"),
            Self::Request => formatter.write_str("shutdown request"),
        }
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Cloneable sender that asks the daemon to shut down.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownTrigger {
    sender: Sender<ShutdownCause>,
}

impl ShutdownTrigger {
    pub(crate) fn fire(&self, cause: ShutdownCause) {
        if self.sender.send(cause).is_err() {
            debug!(target: PROCESS_TARGET, %cause, "shutdown already under way");
        }
    }
}

/// Creates the trigger and the receiver the daemon blocks on.
pub(crate) fn shutdown_channel() -> (ShutdownTrigger, Receiver<ShutdownCause>) {
    let (sender, receiver) = mpsc::channel();
    (ShutdownTrigger { sender }, receiver)
}

/// Background thread forwarding termination signals to a trigger.
pub(crate) struct SignalWatcher {
    handle: Handle,
    thread: JoinHandle<()>,
}

impl SignalWatcher {
    pub(crate) fn install(trigger: ShutdownTrigger) -> Result<Self, ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let thread = thread::spawn(move || {
            for signal in signals.forever() {
                info!(target: PROCESS_TARGET, signal, "shutdown signal received");
                trigger.fire(ShutdownCause::Signal(signal));
            }
        });
        Ok(Self { handle, thread })
    }

    /// Unregisters the handlers and waits for the watcher thread.
    pub(crate) fn close(self) {
        self.handle.close();
        if self.thread.join().is_err() {
            warn!(target: PROCESS_TARGET, "signal watcher thread panicked");
        }
    }
}
