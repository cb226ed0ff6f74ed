//! Errors raised by program supervision.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced while managing supervised programs.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The program name was empty or not usable as a log file name.
    #[error("invalid program name '{name}'")]
    InvalidName {
        /// Rejected name.
        name: String,
    },
    /// The program had no command to run.
    #[error("program \"{name}\" has an empty command")]
    EmptyCommand {
        /// Program name.
        name: String,
    },
    /// A program with the same name is already registered.
    #[error("program \"{name}\" already exists")]
    AlreadyExists {
        /// Program name.
        name: String,
    },
    /// No program with the given name is registered.
    #[error("program \"{name}\" not found")]
    NotFound {
        /// Requested name.
        name: String,
    },
    /// Start was requested for a program that is still running.
    #[error("program \"{name}\" is already running")]
    AlreadyRunning {
        /// Program name.
        name: String,
    },
    /// Stop was requested for a program that is not running.
    #[error("program \"{name}\" is not running")]
    NotRunning {
        /// Program name.
        name: String,
    },
    /// Opening the log directory failed.
    #[error("failed to open log directory '{path}': {source}")]
    LogDirectory {
        /// Log directory path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Opening a program's log file failed.
    #[error("failed to open log for program \"{name}\": {source}")]
    OpenLog {
        /// Program name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The program process could not be spawned.
    #[error("failed to start program \"{name}\": {source}")]
    Spawn {
        /// Program name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Signalling or reaping the program process failed.
    #[error("failed to stop program \"{name}\": {source}")]
    Signal {
        /// Program name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Persisting the program table failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
