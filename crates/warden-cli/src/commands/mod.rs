//! Built-in commands and their handlers.
//!
//! Each variant of [`Command`] declares how it needs the daemon through
//! [`Command::requirement`]; the dispatcher satisfies that before calling
//! [`execute`] with the resolved [`Deps`].

mod programs;
mod supervisor;

use std::io::Write;

use clap::{Args, Subcommand};
use warden_rpc::DEFAULT_TAIL_LINES;

use crate::dispatch::{DaemonRequirement, Deps};
use crate::errors::AppError;

/// Built-in subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Shows the client and daemon versions.
    Version,
    /// Shows the status of every program.
    #[command(visible_alias = "st")]
    Status,
    /// Adds a program to the supervised list and starts it.
    Add(AddArgs),
    /// Starts a program that is not running.
    Start {
        /// Program name.
        name: String,
    },
    /// Stops a running program.
    Stop {
        /// Program name.
        name: String,
    },
    /// Prints the end of a program's log.
    Tail(TailArgs),
    /// Stops every program and shuts the daemon down.
    Shutdown,
    /// Runs the daemon in the foreground. Started by warden itself.
    #[command(hide = true)]
    Serve,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddArgs {
    /// Program name; defaults to the command's file name.
    #[arg(short, long)]
    pub(crate) name: Option<String>,
    /// Extra environment entry for the program.
    #[arg(short, long = "env", value_name = "KEY=VAL", value_parser = parse_env_entry)]
    pub(crate) env: Vec<String>,
    /// Command to run, followed by its arguments.
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub(crate) command: Vec<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct TailArgs {
    /// Number of lines to print.
    #[arg(short, long, default_value_t = DEFAULT_TAIL_LINES)]
    pub(crate) number: usize,
    /// Keep printing lines as they are written.
    #[arg(short, long)]
    pub(crate) follow: bool,
    /// Program name.
    pub(crate) name: String,
}

fn parse_env_entry(entry: &str) -> Result<String, String> {
    match entry.split_once('=') {
        Some((key, _)) if !key.is_empty() => Ok(entry.to_owned()),
        _ => Err(format!("expected KEY=VAL, got '{entry}'")),
    }
}

impl Command {
    /// How this command needs the daemon.
    pub(crate) const fn requirement(&self) -> DaemonRequirement {
        match self {
            Self::Shutdown => DaemonRequirement::ExistingOnly,
            Self::Serve => DaemonRequirement::None,
            Self::Version
            | Self::Status
            | Self::Add(_)
            | Self::Start { .. }
            | Self::Stop { .. }
            | Self::Tail(_) => DaemonRequirement::AutoStart,
        }
    }
}

/// Runs a daemon-backed command.
pub(crate) fn execute<W: Write>(
    command: Command,
    deps: &Deps<'_>,
    stdout: &mut W,
) -> Result<(), AppError> {
    match command {
        Command::Version => supervisor::version(deps, stdout),
        Command::Status => programs::status(deps, stdout),
        Command::Add(args) => programs::add(deps, args, stdout),
        Command::Start { name } => programs::start(deps, &name, stdout),
        Command::Stop { name } => programs::stop(deps, &name, stdout),
        Command::Tail(args) => programs::tail(deps, args, stdout),
        Command::Shutdown => supervisor::shutdown(deps, stdout),
        Command::Serve => Err(AppError::NotDaemonCommand { command: "serve" }),
    }
}
