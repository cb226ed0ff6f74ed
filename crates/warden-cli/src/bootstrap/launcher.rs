//! Launches the daemon by re-invoking the current executable in `serve` mode.

use std::env;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;
use warden_config::Settings;

use super::{BOOTSTRAP_TARGET, BootstrapError, DaemonLauncher, SpawnedDaemon};

/// Subcommand that runs the daemon loop in the foreground.
const SERVE_COMMAND: &str = "serve";

/// Spawns `<current executable> --home .. --addr .. serve` detached from the
/// invoking terminal.
///
/// The child gets its own process group so terminal signals aimed at the CLI
/// do not reach it, no stdin or stdout, and stderr appended to the daemon log
/// in the home directory.
#[derive(Debug, Clone, Default)]
pub(crate) struct SelfLauncher {
    program: Option<PathBuf>,
}

impl SelfLauncher {
    #[cfg(test)]
    pub(crate) fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn program(&self) -> io::Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => env::current_exe(),
        }
    }
}

/// Arguments that make the child bind exactly the endpoint the CLI dials.
pub(crate) fn serve_arguments(settings: &Settings) -> Vec<OsString> {
    let mut arguments: Vec<OsString> = vec![
        "--home".into(),
        settings.paths().home().as_os_str().to_owned(),
        "--addr".into(),
        settings.endpoint().to_string().into(),
        format!("--log-format={}", settings.log_format()).into(),
    ];
    if settings.debug() {
        arguments.push("--debug".into());
    }
    arguments.push(SERVE_COMMAND.into());
    arguments
}

impl DaemonLauncher for SelfLauncher {
    fn launch(&self, settings: &Settings) -> Result<Box<dyn SpawnedDaemon>, BootstrapError> {
        let paths = settings.paths();
        paths.prepare()?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths.daemon_log_path())
            .map_err(|source| BootstrapError::DaemonLog {
                path: paths.daemon_log_path().to_string(),
                source,
            })?;

        let program = self.program().map_err(|source| BootstrapError::Spawn {
            program: String::from("<current executable>"),
            source,
        })?;
        let arguments = serve_arguments(settings);
        debug!(
            target: BOOTSTRAP_TARGET,
            program = %program.display(),
            ?arguments,
            "launching daemon"
        );

        let mut command = Command::new(&program);
        command
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn().map_err(|source| BootstrapError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        Ok(Box::new(ChildDaemon(child)))
    }
}

struct ChildDaemon(Child);

impl SpawnedDaemon for ChildDaemon {
    fn wait(mut self: Box<Self>) -> io::Result<ExitStatus> {
        self.0.wait()
    }
}
