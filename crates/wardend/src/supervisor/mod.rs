//! Program supervision: the persisted table and the processes behind it.
//!
//! Each program sits behind its own lock so a slow stop only blocks callers
//! interested in that program. The table lock is held just long enough to
//! look entries up or change the set of names.

mod errors;
mod program;

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use nix::sys::signal::Signal;
use tracing::{info, warn};

use warden_rpc::{ProgramInfo, ProgramStatus};

use crate::store::ProgramStore;

pub use self::errors::SupervisorError;
use self::program::Program;

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(50);

type Entry = Arc<Mutex<Program>>;

/// Owns every supervised program for the lifetime of the daemon.
#[derive(Debug)]
pub(crate) struct Supervisor {
    store: ProgramStore,
    logs: Dir,
    programs: Mutex<BTreeMap<String, Entry>>,
    stop_timeout: Duration,
}

impl Supervisor {
    /// Loads the persisted table. Every program starts out stopped.
    pub(crate) fn open(store: ProgramStore, log_dir: &Utf8Path) -> Result<Self, SupervisorError> {
        let logs = Dir::open_ambient_dir(log_dir, ambient_authority()).map_err(|source| {
            SupervisorError::LogDirectory {
                path: log_dir.to_path_buf(),
                source,
            }
        })?;
        let programs = store
            .load()?
            .into_iter()
            .map(|info| (info.name.clone(), Arc::new(Mutex::new(Program::new(info)))))
            .collect::<BTreeMap<_, _>>();
        info!(
            target: SUPERVISOR_TARGET,
            programs = programs.len(),
            "program table loaded"
        );
        Ok(Self {
            store,
            logs,
            programs: Mutex::new(programs),
            stop_timeout: STOP_TIMEOUT,
        })
    }

    /// Overrides how long `stop` waits after SIGTERM before sending SIGKILL.
    #[cfg(test)]
    pub(crate) const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Registers, persists and starts a new program.
    ///
    /// A program whose process cannot be spawned stays registered in the
    /// fatal state so `status` can report why.
    pub fn create(&self, info: ProgramInfo) -> Result<(), SupervisorError> {
        validate(&info)?;
        let name = info.name.clone();
        let entry = {
            let mut programs = lock(&self.programs);
            if programs.contains_key(&name) {
                return Err(SupervisorError::AlreadyExists { name });
            }
            let entry = Arc::new(Mutex::new(Program::new(info)));
            programs.insert(name.clone(), Arc::clone(&entry));
            if let Err(error) = self.persist(&programs) {
                programs.remove(&name);
                return Err(error);
            }
            entry
        };
        info!(target: SUPERVISOR_TARGET, program = %name, "program created");
        if let Err(error) = lock(&entry).start(&self.logs) {
            warn!(
                target: SUPERVISOR_TARGET,
                program = %name,
                %error,
                "program failed to start"
            );
        }
        Ok(())
    }

    /// Starts a program that is stopped, exited or fatal.
    pub fn start(&self, name: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        let pid = lock(&entry).start(&self.logs)?;
        info!(target: SUPERVISOR_TARGET, program = %name, pid, "program started");
        Ok(())
    }

    /// Sends SIGTERM to a running program, escalating to SIGKILL once the
    /// stop timeout elapses.
    pub fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        self.stop_entry(name, &entry)
    }

    /// Stops every running program. Failures are logged and skipped.
    pub fn stop_all(&self) {
        let entries: Vec<(String, Entry)> = lock(&self.programs)
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();
        for (name, entry) in entries {
            match self.stop_entry(&name, &entry) {
                Ok(()) | Err(SupervisorError::NotRunning { .. }) => {}
                Err(error) => warn!(
                    target: SUPERVISOR_TARGET,
                    program = %name,
                    %error,
                    "failed to stop program during shutdown"
                ),
            }
        }
    }

    /// Snapshot of every program ordered by name.
    pub fn status(&self) -> Vec<ProgramStatus> {
        let entries: Vec<Entry> = lock(&self.programs).values().map(Arc::clone).collect();
        entries.iter().map(|entry| lock(entry).status()).collect()
    }

    /// Opens a program's log file for reading; `None` until the program has
    /// written anything.
    pub(crate) fn open_log(&self, name: &str) -> Result<Option<File>, SupervisorError> {
        let entry = self.entry(name)?;
        let file_name = lock(&entry).log_file_name();
        match self.logs.open(&file_name) {
            Ok(file) => Ok(Some(file.into_std())),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SupervisorError::OpenLog {
                name: name.to_owned(),
                source,
            }),
        }
    }

    /// Fails with [`SupervisorError::NotFound`] for unknown names.
    pub(crate) fn ensure_exists(&self, name: &str) -> Result<(), SupervisorError> {
        self.entry(name).map(|_| ())
    }

    fn entry(&self, name: &str) -> Result<Entry, SupervisorError> {
        lock(&self.programs)
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| SupervisorError::NotFound {
                name: name.to_owned(),
            })
    }

    fn stop_entry(&self, name: &str, entry: &Entry) -> Result<(), SupervisorError> {
        let signalled = {
            let mut program = lock(entry);
            program.is_running() && program.signal(Signal::SIGTERM)?
        };
        if !signalled {
            return Err(SupervisorError::NotRunning {
                name: name.to_owned(),
            });
        }

        let deadline = Instant::now() + self.stop_timeout;
        loop {
            let mut program = lock(entry);
            if !program.is_running() {
                program.mark_stopped()?;
                info!(target: SUPERVISOR_TARGET, program = %name, "program stopped");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(
                    target: SUPERVISOR_TARGET,
                    program = %name,
                    timeout_ms = self.stop_timeout.as_millis(),
                    "program ignored SIGTERM; killing"
                );
                program.signal(Signal::SIGKILL)?;
                program.mark_stopped()?;
                return Ok(());
            }
            drop(program);
            thread::sleep(STOP_POLL);
        }
    }

    fn persist(&self, programs: &BTreeMap<String, Entry>) -> Result<(), SupervisorError> {
        let infos: Vec<ProgramInfo> = programs
            .values()
            .map(|entry| lock(entry).info().clone())
            .collect();
        self.store.save(&infos).map_err(SupervisorError::from)
    }
}

fn validate(info: &ProgramInfo) -> Result<(), SupervisorError> {
    let name = info.name.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(SupervisorError::InvalidName {
            name: name.to_owned(),
        });
    }
    if info.command.is_empty() {
        return Err(SupervisorError::EmptyCommand {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Program state stays usable after a handler thread panics mid-update.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
