//! Command-line runtime for warden.
//!
//! The runtime owns argument parsing, configuration bootstrapping, lazy daemon
//! start-up and command dispatch. Every invocation follows the same path:
//!
//! 1. split the leading configuration flags off and resolve [`Settings`];
//! 2. discover plugins and build the command table;
//! 3. either hand control to a plugin process, or satisfy the command's
//!    daemon requirement (starting the daemon when needed) and run its
//!    handler over a single connection.
//!
//! Configuration loading, daemon launching and the IO streams can all be
//! substituted so tests exercise the runtime without touching the real
//! environment.

use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use tracing::debug;
use warden_config::{DEFAULT_CLIENT_LOG_FILTER, Settings};
use warden_plugins::process::ProcessExecutor;
use warden_plugins::{PluginEnvironment, PluginError, PluginRegistry, PluginRunner};

mod bootstrap;
mod cli;
mod commands;
mod config;
mod dispatch;
mod errors;
mod output;
mod rpc;
mod transport;

use bootstrap::{DaemonLauncher, SelfLauncher};
use cli::{CommandTable, Invocation};
use commands::Command;
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
use dispatch::{Dispatcher, InvocationContext};
pub(crate) use errors::AppError;

const CLI_TARGET: &str = env!("CARGO_PKG_NAME");

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader, D: DaemonLauncher + ?Sized> {
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
    launcher: &'a D,
}

impl<'a, W, E, L, D> CliRunner<'a, W, E, L, D>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
    D: DaemonLauncher + ?Sized,
{
    const fn new(io: &'a mut IoStreams<'a, W, E>, loader: &'a L, launcher: &'a D) -> Self {
        Self {
            io,
            loader,
            launcher,
        }
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        match self.try_run(args) {
            Ok(exit_code) => exit_code,
            Err(error) => {
                let _ = writeln!(self.io.stderr, "warden: {error}");
                ExitCode::FAILURE
            }
        }
    }

    fn try_run<I>(&mut self, args: I) -> Result<ExitCode, AppError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli_arguments = prepare_cli_arguments(&args, &split);

        let config = self.loader.load(&split.config_arguments)?;
        let settings = Settings::from_config(&config)?;
        let registry = PluginRegistry::discover(settings.paths().plugin_dir().as_std_path());
        let table = CommandTable::build(registry);

        let invocation = match table.parse(cli_arguments) {
            Ok(invocation) => invocation,
            Err(error) => return Ok(self.report_usage(&error)),
        };
        if !matches!(invocation, Invocation::Builtin(Command::Serve)) {
            wardend::telemetry::initialise(&settings, DEFAULT_CLIENT_LOG_FILTER)?;
            table.warn_shadowed();
        }

        match invocation {
            Invocation::Plugin { name, args } => run_plugin(table.registry(), &settings, &name, &args),
            Invocation::Builtin(command) => {
                let context = InvocationContext::capture(&settings)?;
                Dispatcher::new(self.launcher).dispatch(
                    command,
                    &context,
                    &mut *self.io.stdout,
                    &mut *self.io.stderr,
                )?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    /// Prints help, or a usage error, the way clap would when exiting.
    fn report_usage(&mut self, error: &clap::Error) -> ExitCode {
        let rendered = error.render().to_string();
        let _ = if error.use_stderr() {
            self.io.stderr.write_all(rendered.as_bytes())
        } else {
            self.io.stdout.write_all(rendered.as_bytes())
        };
        u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    run_with_loader(args, &mut io, &OrthoConfigLoader, &SelfLauncher::default())
}

/// Runs the CLI with a custom configuration loader and daemon launcher.
pub(crate) fn run_with_loader<'a, I, W, E, L, D>(
    args: I,
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
    launcher: &'a D,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    D: DaemonLauncher + ?Sized,
{
    CliRunner::new(io, loader, launcher).run(args)
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if let Some(rest) = args.get(split.command_start..) {
        cli_arguments.extend(rest.iter().cloned());
    }
    cli_arguments
}

/// Executes a plugin with the invocation's daemon address exported. The
/// plugin's exit status becomes the invocation's.
fn run_plugin(
    registry: &PluginRegistry,
    settings: &Settings,
    name: &str,
    args: &[OsString],
) -> Result<ExitCode, AppError> {
    let program = env::current_exe().map_err(AppError::CurrentExecutable)?;
    let environment = PluginEnvironment::new(settings.endpoint().to_string(), program);
    let runner = PluginRunner::new(registry.clone(), environment, ProcessExecutor);
    match runner.run(name, args) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(error @ PluginError::NonZeroExit { status, .. }) => {
            debug!(target: CLI_TARGET, %error, "plugin failed");
            Ok(u8::try_from(status).map_or(ExitCode::FAILURE, ExitCode::from))
        }
        Err(error @ PluginError::Terminated { signal: Some(signal), .. }) => {
            debug!(target: CLI_TARGET, %error, "plugin killed by signal");
            Ok(u8::try_from(128 + signal).map_or(ExitCode::FAILURE, ExitCode::from))
        }
        Err(error) => Err(error.into()),
    }
}
