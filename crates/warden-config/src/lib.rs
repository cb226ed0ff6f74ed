//! Shared configuration for the warden CLI and daemon.
//!
//! [`Config`] is the layered value produced by `ortho_config` (defaults, a
//! TOML file selected with `--config-path`, `WARDEN_*` environment variables
//! and CLI flags). [`Settings`] resolves it once at startup into the
//! immutable value both binaries thread through their call graphs: the home
//! directory layout, the daemon endpoint and the logging switches.

mod defaults;
mod endpoint;
mod home;
mod logging;
mod settings;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEBUG_LOG_FILTER, DEFAULT_CLIENT_LOG_FILTER, DEFAULT_DAEMON_LOG_FILTER, HOME_DIR_NAME,
    default_home_dir, default_log_format,
};
pub use endpoint::{DaemonEndpoint, EndpointParseError, SocketPreparationError, TransportKind};
pub use home::{HomeError, HomePaths};
pub use logging::{LogFormat, LogFormatParseError};
pub use settings::{ServerConfigFile, ServerSection, Settings, SettingsError};

/// Layered configuration shared by the CLI and daemon.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// Home directory holding the socket, program list, logs and plugins.
    #[serde(default)]
    pub home: Option<Utf8PathBuf>,
    /// Daemon address overriding `warden.json` and the default socket.
    #[serde(default)]
    #[ortho_config(cli_long = "addr")]
    pub server_addr: Option<String>,
    /// Enables debug logging.
    #[serde(default)]
    #[ortho_config(default = false, cli_short = 'd')]
    pub debug: bool,
    /// Format used for diagnostics written to stderr.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: None,
            server_addr: None,
            debug: false,
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Home directory, falling back to `$HOME/.warden`.
    #[must_use]
    pub fn home_dir(&self) -> Utf8PathBuf {
        self.home.clone().unwrap_or_else(default_home_dir)
    }

    /// Raw daemon address when configured through flags, environment or TOML.
    #[must_use]
    pub fn server_addr(&self) -> Option<&str> {
        self.server_addr.as_deref()
    }

    /// Whether debug logging was requested.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Logging output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
