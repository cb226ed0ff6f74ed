//! Entry point for the `warden` binary.
//!
//! Delegates to [`warden_cli::run`], which resolves configuration, discovers
//! plugins, starts the daemon on demand and dispatches the command.
//!
//! The standard streams are passed unlocked: `serve` runs the daemon on this
//! process and its worker threads log to stderr.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    warden_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
