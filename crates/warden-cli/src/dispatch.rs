//! Per-invocation dependency resolution.
//!
//! A command states how it needs the daemon through [`DaemonRequirement`].
//! The [`Dispatcher`] satisfies that requirement with at most one daemon
//! launch and exactly one connection, builds the RPC facades on top of that
//! connection, and hands them to the handler as a [`Deps`] value.

use std::cell::RefCell;
use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;
use warden_config::Settings;

use crate::bootstrap::{Bootstrap, DaemonLauncher, PROBE_TIMEOUT, ensure_daemon};
use crate::commands::{self, Command};
use crate::errors::AppError;
use crate::rpc::{ProgramClient, RpcChannel, SupervisorClient};
use crate::transport::{CONNECTION_TIMEOUT, Connection, dial};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Printed by `shutdown` when no daemon is listening.
pub(crate) const ALREADY_CLOSED: &str = "server already closed";

/// How a command needs the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DaemonRequirement {
    /// Start the daemon when it is not reachable.
    AutoStart,
    /// Use a running daemon; do nothing when there is none.
    ExistingOnly,
    /// Never contact the daemon.
    None,
}

/// Resolved global settings plus the caller's process environment.
#[derive(Debug)]
pub(crate) struct InvocationContext<'a> {
    pub(crate) settings: &'a Settings,
    pub(crate) working_dir: PathBuf,
    pub(crate) search_path: Option<OsString>,
}

impl<'a> InvocationContext<'a> {
    /// Captures the working directory and `PATH` of the current process.
    pub(crate) fn capture(settings: &'a Settings) -> Result<Self, AppError> {
        let working_dir = env::current_dir().map_err(AppError::WorkingDirectory)?;
        Ok(Self {
            settings,
            working_dir,
            search_path: env::var_os("PATH"),
        })
    }
}

/// Everything a daemon-backed handler may use.
pub(crate) struct Deps<'a> {
    pub(crate) context: &'a InvocationContext<'a>,
    pub(crate) programs: ProgramClient,
    pub(crate) supervisor: SupervisorClient,
}

impl<'a> Deps<'a> {
    /// Builds both facades over one shared channel.
    fn resolve(context: &'a InvocationContext<'a>, connection: Connection) -> Result<Self, AppError> {
        let channel = RpcChannel::open(connection).map_err(AppError::Channel)?;
        let channel = Rc::new(RefCell::new(channel));
        Ok(Self {
            context,
            programs: ProgramClient::new(Rc::clone(&channel)),
            supervisor: SupervisorClient::new(channel),
        })
    }
}

/// Routes built-in commands to their handlers.
pub(crate) struct Dispatcher<'a, L: ?Sized> {
    launcher: &'a L,
}

impl<'a, L> Dispatcher<'a, L>
where
    L: DaemonLauncher + ?Sized,
{
    pub(crate) const fn new(launcher: &'a L) -> Self {
        Self { launcher }
    }

    /// Satisfies the command's daemon requirement and runs it.
    pub(crate) fn dispatch<W, E>(
        &self,
        command: Command,
        context: &InvocationContext<'_>,
        stdout: &mut W,
        stderr: &mut E,
    ) -> Result<(), AppError>
    where
        W: Write,
        E: Write,
    {
        let requirement = command.requirement();
        debug!(target: DISPATCH_TARGET, ?command, ?requirement, "dispatching");
        match requirement {
            DaemonRequirement::None => {
                wardend::run_daemon(context.settings).map_err(AppError::Daemon)
            }
            DaemonRequirement::ExistingOnly => {
                let Some(connection) = self.existing(context.settings)? else {
                    return writeln!(stdout, "{ALREADY_CLOSED}").map_err(AppError::Output);
                };
                let deps = Deps::resolve(context, connection)?;
                commands::execute(command, &deps, stdout)
            }
            DaemonRequirement::AutoStart => {
                let connection = self.ensure(context.settings, stderr)?;
                let deps = Deps::resolve(context, connection)?;
                commands::execute(command, &deps, stdout)
            }
        }
    }

    fn ensure<E: Write>(&self, settings: &Settings, stderr: &mut E) -> Result<Connection, AppError> {
        match ensure_daemon(settings, self.launcher, stderr)? {
            Bootstrap::AlreadyRunning(connection) => Ok(connection),
            Bootstrap::Started => Ok(dial(settings.endpoint(), CONNECTION_TIMEOUT)?),
        }
    }

    fn existing(&self, settings: &Settings) -> Result<Option<Connection>, AppError> {
        match dial(settings.endpoint(), PROBE_TIMEOUT) {
            Ok(connection) => Ok(Some(connection)),
            Err(error) if error.is_not_running() => {
                debug!(target: DISPATCH_TARGET, %error, "no daemon to contact");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }
}
