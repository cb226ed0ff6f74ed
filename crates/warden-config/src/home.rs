//! Derives the home directory layout shared by the CLI and daemon.
//!
//! The home directory houses the daemon socket, the JSON server configuration,
//! the persisted program list, per-program logs and the plugin root. Both
//! sides of the socket need to agree on the layout so `warden serve` writes
//! where `warden tail` expects to read.

use std::fs::DirBuilder;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

const SOCKET_FILE: &str = "warden.sock";
const SERVER_CONFIG_FILE: &str = "warden.json";
const PROGRAMS_FILE: &str = "programs.json";
const PLUGIN_DIR: &str = "cmdplugin";
const LOG_DIR: &str = "logs";
const DAEMON_LOG_FILE: &str = "wardend.log";

/// Canonical paths below the warden home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomePaths {
    home: Utf8PathBuf,
    socket_path: Utf8PathBuf,
    server_config_path: Utf8PathBuf,
    programs_path: Utf8PathBuf,
    plugin_dir: Utf8PathBuf,
    log_dir: Utf8PathBuf,
    daemon_log_path: Utf8PathBuf,
}

impl HomePaths {
    /// Derives every path from the given home directory without touching the
    /// filesystem.
    #[must_use]
    pub fn new(home: impl Into<Utf8PathBuf>) -> Self {
        let home = home.into();
        Self {
            socket_path: home.join(SOCKET_FILE),
            server_config_path: home.join(SERVER_CONFIG_FILE),
            programs_path: home.join(PROGRAMS_FILE),
            plugin_dir: home.join(PLUGIN_DIR),
            log_dir: home.join(LOG_DIR),
            daemon_log_path: home.join(DAEMON_LOG_FILE),
            home,
        }
    }

    /// Creates the home and log directories when they are missing.
    pub fn prepare(&self) -> Result<(), HomeError> {
        create_dir(&self.home)?;
        create_dir(&self.log_dir)
    }

    /// The home directory itself.
    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    /// Default Unix socket used when no address is configured.
    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    /// JSON server configuration file.
    pub fn server_config_path(&self) -> &Utf8Path {
        &self.server_config_path
    }

    /// JSON program list persisted by the daemon.
    pub fn programs_path(&self) -> &Utf8Path {
        &self.programs_path
    }

    /// Root directory scanned for plugin commands.
    pub fn plugin_dir(&self) -> &Utf8Path {
        &self.plugin_dir
    }

    /// Directory holding per-program logs.
    pub fn log_dir(&self) -> &Utf8Path {
        &self.log_dir
    }

    /// File receiving the daemon's own diagnostics when auto-started.
    pub fn daemon_log_path(&self) -> &Utf8Path {
        &self.daemon_log_path
    }

    /// Log file name for a supervised program, relative to [`Self::log_dir`].
    #[must_use]
    pub fn program_log_name(name: &str) -> String {
        format!("{name}.log")
    }
}

/// Resolves a relative path against the current directory without touching
/// the filesystem.
pub(crate) fn absolutize(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let resolved = std::path::absolute(path.as_std_path())?;
    Utf8PathBuf::from_path_buf(resolved).map_err(|resolved| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("'{}' is not valid UTF-8", resolved.display()),
        )
    })
}

fn create_dir(path: &Utf8Path) -> Result<(), HomeError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    match builder.create(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(HomeError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Errors raised while preparing the home directory.
#[derive(Debug, Error)]
pub enum HomeError {
    /// Creating a directory failed.
    #[error("failed to prepare directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}
