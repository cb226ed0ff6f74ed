//! Runtime state of one supervised program.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;

use cap_std::fs::{Dir, OpenOptions};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use warden_config::HomePaths;
use warden_rpc::{ProgramInfo, ProgramState, ProgramStatus};

use super::{SUPERVISOR_TARGET, SupervisorError};

#[derive(Debug)]
enum Runtime {
    Stopped,
    Running(Child),
    Exited(ExitStatus),
    Fatal(String),
}

/// A registered program and its current process, if any.
#[derive(Debug)]
pub(super) struct Program {
    info: ProgramInfo,
    runtime: Runtime,
}

impl Program {
    pub(super) const fn new(info: ProgramInfo) -> Self {
        Self {
            info,
            runtime: Runtime::Stopped,
        }
    }

    pub(super) const fn info(&self) -> &ProgramInfo {
        &self.info
    }

    pub(super) fn log_file_name(&self) -> String {
        HomePaths::program_log_name(&self.info.name)
    }

    /// Reaps the child if it has exited since the last check.
    pub(super) fn refresh(&mut self) {
        let Runtime::Running(child) = &mut self.runtime else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: SUPERVISOR_TARGET,
                    program = %self.info.name,
                    %status,
                    "program exited"
                );
                self.runtime = Runtime::Exited(status);
            }
            Ok(None) => {}
            Err(error) => warn!(
                target: SUPERVISOR_TARGET,
                program = %self.info.name,
                %error,
                "failed to poll program"
            ),
        }
    }

    pub(super) fn is_running(&mut self) -> bool {
        self.refresh();
        matches!(self.runtime, Runtime::Running(_))
    }

    pub(super) fn status(&mut self) -> ProgramStatus {
        self.refresh();
        let (status, extra) = match &self.runtime {
            Runtime::Stopped => (ProgramState::Stopped, String::new()),
            Runtime::Running(child) => (ProgramState::Running, format!("pid {}", child.id())),
            Runtime::Exited(status) => (ProgramState::Exited, describe_exit(*status)),
            Runtime::Fatal(reason) => (ProgramState::Fatal, reason.clone()),
        };
        ProgramStatus {
            name: self.info.name.clone(),
            status,
            extra,
        }
    }

    /// Spawns the program with its output appended to its log file.
    ///
    /// A spawn failure leaves the program in the fatal state.
    pub(super) fn start(&mut self, logs: &Dir) -> Result<u32, SupervisorError> {
        if self.is_running() {
            return Err(SupervisorError::AlreadyRunning {
                name: self.info.name.clone(),
            });
        }
        match self.spawn(logs) {
            Ok(child) => {
                let pid = child.id();
                self.runtime = Runtime::Running(child);
                Ok(pid)
            }
            Err(error) => {
                self.runtime = Runtime::Fatal(error.to_string());
                Err(SupervisorError::Spawn {
                    name: self.info.name.clone(),
                    source: Arc::new(error),
                })
            }
        }
    }

    fn spawn(&self, logs: &Dir) -> io::Result<Child> {
        let Some((program, args)) = self.info.command.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        };
        let stdout = logs
            .open_with(
                self.log_file_name(),
                OpenOptions::new().create(true).append(true),
            )?
            .into_std();
        let stderr = stdout.try_clone()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.info.directory)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        for entry in &self.info.environ {
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    command.env(key, value);
                }
                _ => warn!(
                    target: SUPERVISOR_TARGET,
                    program = %self.info.name,
                    entry = %entry,
                    "ignoring malformed environment entry"
                ),
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command.spawn()
    }

    /// Sends `signal` to the program's process group. Returns `false` when
    /// the program is not running.
    pub(super) fn signal(&mut self, signal: Signal) -> Result<bool, SupervisorError> {
        let Runtime::Running(child) = &self.runtime else {
            return Ok(false);
        };
        let pid = i32::try_from(child.id()).map_err(|_| SupervisorError::Signal {
            name: self.info.name.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, "pid out of range"),
        })?;
        match killpg(Pid::from_raw(pid), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(true),
            Err(errno) => Err(SupervisorError::Signal {
                name: self.info.name.clone(),
                source: io::Error::from(errno),
            }),
        }
    }

    /// Reaps a signalled child and records it as stopped.
    pub(super) fn mark_stopped(&mut self) -> Result<(), SupervisorError> {
        if let Runtime::Running(child) = &mut self.runtime {
            child.wait().map_err(|source| SupervisorError::Signal {
                name: self.info.name.clone(),
                source,
            })?;
        }
        self.runtime = Runtime::Stopped;
        Ok(())
    }
}

fn describe_exit(status: ExitStatus) -> String {
    let code = status.code().or_else(|| terminating_signal(status).map(|signal| 128 + signal));
    code.map_or_else(|| status.to_string(), |code| format!("exit status {code}"))
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
