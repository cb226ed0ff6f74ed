//! Daemon lifecycle: startup, signal handling and orderly shutdown.

mod errors;
mod launch;
mod shutdown;

pub use self::errors::LaunchError;
pub use self::launch::{Daemon, run_daemon};
pub use self::shutdown::{ShutdownCause, ShutdownError};
pub(crate) use self::shutdown::{ShutdownTrigger, SignalWatcher, shutdown_channel};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
