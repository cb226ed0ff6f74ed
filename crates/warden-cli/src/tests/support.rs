//! Test support for CLI runtime coverage.
//!
//! Supplies a fixed configuration loader, a launcher that hosts the daemon
//! on threads of the test process, and a world type that captures the
//! output of each invocation.

use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitCode, ExitStatus};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use camino::Utf8PathBuf;
use tempfile::TempDir;
use warden_config::{Config, Settings};
use wardend::Daemon;

use crate::bootstrap::{BootstrapError, DaemonLauncher, SpawnedDaemon};
use crate::{AppError, ConfigLoader, IoStreams, run_with_loader};

/// A config loader that returns a fixed configuration for tests.
pub(super) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(super) const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// Starts the daemon inside the test process and counts launches.
///
/// Launched daemons are stopped when the launcher is dropped; until then
/// their stand-in child never exits.
#[derive(Default)]
pub(super) struct InProcessLauncher {
    launches: Cell<usize>,
    daemons: RefCell<Vec<Daemon>>,
    alive: RefCell<Vec<Sender<()>>>,
}

impl InProcessLauncher {
    pub(super) fn launches(&self) -> usize {
        self.launches.get()
    }
}

impl DaemonLauncher for InProcessLauncher {
    fn launch(&self, settings: &Settings) -> Result<Box<dyn SpawnedDaemon>, BootstrapError> {
        self.launches.set(self.launches.get() + 1);
        let daemon = Daemon::start(settings).map_err(|error| BootstrapError::Spawn {
            program: String::from("in-process daemon"),
            source: io::Error::other(error.to_string()),
        })?;
        let (alive, exit) = mpsc::channel();
        self.daemons.borrow_mut().push(daemon);
        self.alive.borrow_mut().push(alive);
        Ok(Box::new(HostedDaemon { exit }))
    }
}

impl Drop for InProcessLauncher {
    fn drop(&mut self) {
        self.alive.get_mut().clear();
        for daemon in self.daemons.get_mut().drain(..) {
            let _ = daemon.stop();
        }
    }
}

/// Child handle for a hosted daemon; exits once its launcher goes away.
struct HostedDaemon {
    exit: Receiver<()>,
}

impl SpawnedDaemon for HostedDaemon {
    fn wait(self: Box<Self>) -> io::Result<ExitStatus> {
        let _ = self.exit.recv();
        Ok(ExitStatus::from_raw(0))
    }
}

/// Test world holding the home directory, daemons and captured output.
pub(super) struct TestWorld {
    pub(super) config: Config,
    pub(super) launcher: InProcessLauncher,
    pub(super) stdout: Vec<u8>,
    pub(super) stderr: Vec<u8>,
    pub(super) exit_code: Option<ExitCode>,
    running: Option<Daemon>,
    home: TempDir,
}

impl TestWorld {
    pub(super) fn new() -> Result<Self> {
        let home = tempfile::tempdir().context("create home directory")?;
        let root = Utf8PathBuf::from_path_buf(home.path().to_path_buf())
            .map_err(|path| anyhow::anyhow!("non-UTF-8 home {}", path.display()))?;
        let config = Config {
            home: Some(root),
            ..Config::default()
        };
        Ok(Self {
            config,
            launcher: InProcessLauncher::default(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
            running: None,
            home,
        })
    }

    pub(super) fn settings(&self) -> Result<Settings> {
        Settings::from_config(&self.config).context("resolve settings")
    }

    /// Starts a daemon before any command runs, bypassing the launcher.
    pub(super) fn start_daemon(&mut self) -> Result<()> {
        let daemon = Daemon::start(&self.settings()?).context("start daemon")?;
        self.running = Some(daemon);
        Ok(())
    }

    /// Starts a daemon on an ephemeral loopback port and points the
    /// configuration at it.
    pub(super) fn start_tcp_daemon(&mut self) -> Result<()> {
        self.config.server_addr = Some(String::from("tcp://127.0.0.1:0"));
        let daemon = Daemon::start(&self.settings()?).context("start tcp daemon")?;
        self.config.server_addr = Some(daemon.endpoint().to_string());
        self.running = Some(daemon);
        Ok(())
    }

    /// Runs `warden` with whitespace-separated arguments.
    pub(super) fn run(&mut self, command: &str) {
        let args = command.split_whitespace().map(str::to_owned).collect();
        self.run_args(args);
    }

    pub(super) fn run_args(&mut self, args: Vec<String>) {
        self.stdout.clear();
        self.stderr.clear();
        let mut argv = vec![OsString::from("warden")];
        argv.extend(args.into_iter().map(OsString::from));
        let loader = StaticConfigLoader::new(self.config.clone());
        let mut io = IoStreams::new(&mut self.stdout, &mut self.stderr);
        let exit = run_with_loader(argv, &mut io, &loader, &self.launcher);
        self.exit_code = Some(exit);
    }

    /// Reruns `command` until stdout satisfies `accept` or a few seconds
    /// pass, for output that depends on programs catching up.
    pub(super) fn run_until(&mut self, command: &str, accept: impl Fn(&str) -> bool) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            self.run(command);
            if accept(&self.stdout_text()?) {
                return Ok(());
            }
            ensure!(
                Instant::now() < deadline,
                "`{command}` never produced the expected output; last stdout: {:?}",
                self.stdout_text()?
            );
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Installs an executable plugin script under the home's plugin root.
    pub(super) fn install_plugin(&self, name: &str, script: &str) -> Result<()> {
        let settings = self.settings()?;
        let dir = settings.paths().plugin_dir().join(name);
        fs::create_dir_all(&dir).with_context(|| format!("create plugin dir {dir}"))?;
        let entry_point = dir.join("run");
        fs::write(&entry_point, script).context("write plugin script")?;
        fs::set_permissions(&entry_point, fs::Permissions::from_mode(0o755))
            .context("mark plugin executable")?;
        Ok(())
    }

    pub(super) fn home_file(&self, relative: &str) -> Result<String> {
        let path = self.home.path().join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub(super) fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone()).context("stdout is not UTF-8")
    }

    pub(super) fn stderr_text(&self) -> Result<String> {
        String::from_utf8(self.stderr.clone()).context("stderr is not UTF-8")
    }

    pub(super) fn assert_exit_code(&self, expected: u8) -> Result<()> {
        let exit = self.exit_code.context("exit code recorded")?;
        ensure!(
            exit == ExitCode::from(expected),
            "expected exit code {expected}, got {exit:?}; stderr: {:?}",
            self.stderr_text()?
        );
        Ok(())
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        if let Some(daemon) = self.running.take() {
            let _ = daemon.stop();
        }
    }
}
