//! Handlers for daemon-wide commands.

use std::io::Write;

use crate::dispatch::Deps;
use crate::errors::AppError;

/// Version of this client binary.
pub(crate) const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(super) fn version<W: Write>(deps: &Deps<'_>, stdout: &mut W) -> Result<(), AppError> {
    writeln!(stdout, "Client: {CLIENT_VERSION}").map_err(AppError::Output)?;
    let server = deps.supervisor.version()?;
    writeln!(stdout, "Server: {server}").map_err(AppError::Output)
}

pub(super) fn shutdown<W: Write>(deps: &Deps<'_>, stdout: &mut W) -> Result<(), AppError> {
    let message = deps.supervisor.shutdown()?;
    writeln!(stdout, "{message}").map_err(AppError::Output)
}
