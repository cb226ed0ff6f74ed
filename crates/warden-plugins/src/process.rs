//! Process-based plugin execution.
//!
//! [`ProcessExecutor`] implements the [`PluginExecutor`] trait by running the
//! plugin's entry point as a child process. The child inherits the caller's
//! standard streams so interactive plugins behave like built-in commands, and
//! the CLI blocks until it exits.

use std::ffi::OsString;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::PluginDescriptor;
use crate::environment::PluginEnvironment;
use crate::error::PluginError;
use crate::runner::PluginExecutor;

/// Tracing target for plugin process operations.
const PLUGIN_TARGET: &str = "warden_plugins::process";

/// Executes plugins as child processes with inherited standard streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl PluginExecutor for ProcessExecutor {
    fn execute(
        &self,
        plugin: &PluginDescriptor,
        args: &[OsString],
        environment: &PluginEnvironment,
    ) -> Result<(), PluginError> {
        debug!(
            target: PLUGIN_TARGET,
            plugin = plugin.name(),
            entry_point = %plugin.entry_point().display(),
            argc = args.len(),
            "spawning plugin process"
        );

        let status = Command::new(plugin.entry_point())
            .args(args)
            .current_dir(plugin.directory())
            .envs(environment.vars(plugin))
            .status()
            .map_err(|source| PluginError::SpawnFailed {
                name: plugin.name().to_owned(),
                source: Arc::new(source),
            })?;

        debug!(
            target: PLUGIN_TARGET,
            plugin = plugin.name(),
            ?status,
            "plugin process exited"
        );
        check_status(plugin.name(), status)
    }
}

fn check_status(name: &str, status: ExitStatus) -> Result<(), PluginError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(PluginError::NonZeroExit {
            name: name.to_owned(),
            status: code,
        }),
        None => Err(PluginError::Terminated {
            name: name.to_owned(),
            signal: terminating_signal(status),
        }),
    }
}

#[cfg(unix)]
fn terminating_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
const fn terminating_signal(_status: ExitStatus) -> Option<i32> {
    None
}
