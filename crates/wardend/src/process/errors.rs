//! Defines the error surface for daemon startup and shutdown.

use thiserror::Error;

use warden_config::{HomeError, SocketPreparationError};

use crate::supervisor::SupervisorError;
use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or running the daemon.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Telemetry could not be installed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[from]
        source: TelemetryError,
    },
    /// The home directory layout could not be created.
    #[error("failed to prepare home directory: {source}")]
    Home {
        /// Underlying filesystem error.
        #[from]
        source: HomeError,
    },
    /// Preparing the socket filesystem failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[from]
        source: SocketPreparationError,
    },
    /// The program table could not be loaded.
    #[error("failed to load programs: {source}")]
    Supervisor {
        /// Underlying supervisor error.
        #[from]
        source: SupervisorError,
    },
    /// Binding or running the socket listener failed.
    #[error("daemon socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[from]
        source: ListenerError,
    },
    /// Waiting for shutdown signals could not be arranged.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[from]
        source: ShutdownError,
    },
}
