//! Error type reported by the CLI runtime.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use warden_config::SettingsError;
use warden_plugins::PluginError;
use wardend::{LaunchError, TelemetryError};

use crate::bootstrap::BootstrapError;
use crate::rpc::RpcError;
use crate::transport::DialError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("failed to resolve settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Transport(#[from] DialError),
    #[error("failed to open daemon channel: {0}")]
    Channel(#[source] io::Error),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("daemon failed: {0}")]
    Daemon(#[source] LaunchError),
    #[error("failed to determine the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),
    #[error("failed to locate the warden executable: {0}")]
    CurrentExecutable(#[source] io::Error),
    #[error("no command given")]
    MissingCommand,
    #[error("cannot derive a program name from '{command}'; pass --name")]
    UnnamedProgram { command: String },
    #[error("executable '{program}' not found")]
    ExecutableNotFound { program: String },
    #[error("path {path:?} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
    #[error("'{command}' does not talk to the daemon")]
    NotDaemonCommand { command: &'static str },
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}
