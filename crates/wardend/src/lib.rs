//! The `wardend` supervisor daemon.
//!
//! The daemon keeps a persisted table of programs under the warden home
//! directory, spawns them with their output appended to per-program log
//! files, and answers the JSONL protocol defined in [`warden_rpc`] over a
//! Unix domain socket or TCP endpoint. The `warden` CLI starts it on demand
//! by re-invoking itself in `serve` mode, which calls [`run_daemon`].
//!
//! Shutdown is orderly whichever way it is requested: on `SIGTERM`,
//! `SIGINT`, `SIGQUIT`, `SIGHUP` or a `shutdown` call the daemon stops
//! accepting connections, terminates every running program and removes its
//! socket file.

mod process;
mod service;
mod store;
mod supervisor;
pub mod telemetry;
mod transport;

pub use process::{Daemon, LaunchError, ShutdownCause, ShutdownError, run_daemon};
pub use service::DAEMON_VERSION;
pub use store::StoreError;
pub use supervisor::SupervisorError;
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
