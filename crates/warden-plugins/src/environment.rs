//! Environment variables passed to plugin processes.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::descriptor::PluginDescriptor;

/// Resolved daemon address, in the URL form accepted by `--addr`.
pub const ENV_SERVER_ADDR: &str = "WARDEN_SERVER_ADDR";
/// Name the plugin was invoked under.
pub const ENV_PLUGIN_NAME: &str = "WARDEN_PLUGIN_NAME";
/// Absolute path of the `warden` executable that launched the plugin.
pub const ENV_PROGRAM: &str = "WARDEN_PROGRAM";

/// Invocation-wide values exported to every plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEnvironment {
    server_addr: String,
    program: PathBuf,
}

impl PluginEnvironment {
    /// Captures the daemon address and the invoking executable.
    #[must_use]
    pub fn new(server_addr: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            server_addr: server_addr.into(),
            program: program.into(),
        }
    }

    /// Daemon address exported as [`ENV_SERVER_ADDR`].
    #[must_use]
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// Variables to add on top of the inherited environment.
    #[must_use]
    pub fn vars(&self, plugin: &PluginDescriptor) -> Vec<(&'static str, OsString)> {
        vec![
            (ENV_SERVER_ADDR, OsString::from(&self.server_addr)),
            (ENV_PLUGIN_NAME, OsString::from(plugin.name())),
            (ENV_PROGRAM, self.program.clone().into_os_string()),
        ]
    }
}
