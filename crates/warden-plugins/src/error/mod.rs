//! Domain errors raised by plugin operations.
//!
//! I/O errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy
//! lint and to keep the enum cheaply cloneable in test doubles.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from plugin discovery and execution.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin with the requested name was discovered.
    #[error("plugin '{name}' not found in registry")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// A plugin with the same name is already registered.
    #[error("plugin '{name}' is already registered")]
    Duplicate {
        /// Conflicting name.
        name: String,
    },

    /// The plugin directory has no `run` file.
    #[error("plugin '{name}' has no entry point at {path}")]
    MissingEntryPoint {
        /// Plugin name.
        name: String,
        /// Expected entry point path.
        path: PathBuf,
    },

    /// The `run` file exists but carries no execute permission.
    #[error("plugin '{name}' entry point {path} is not executable")]
    NotExecutable {
        /// Plugin name.
        name: String,
        /// Entry point path.
        path: PathBuf,
    },

    /// The entry point metadata could not be read.
    #[error("failed to inspect entry point {path} of plugin '{name}': {source}")]
    Inspect {
        /// Plugin name.
        name: String,
        /// Entry point path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin process could not be spawned or awaited.
    #[error("plugin '{name}' failed to start: {source}")]
    SpawnFailed {
        /// Plugin name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin exited with a non-zero status code.
    #[error("plugin '{name}' exited with non-zero status {status}")]
    NonZeroExit {
        /// Plugin name.
        name: String,
        /// Process exit status.
        status: i32,
    },

    /// The plugin was terminated by a signal.
    #[error("plugin '{name}' was terminated{}", signal_suffix(.signal))]
    Terminated {
        /// Plugin name.
        name: String,
        /// Terminating signal number, when known.
        signal: Option<i32>,
    },
}

fn signal_suffix(signal: &Option<i32>) -> String {
    signal
        .map(|number| format!(" by signal {number}"))
        .unwrap_or_default()
}
