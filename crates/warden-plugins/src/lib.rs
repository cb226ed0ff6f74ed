//! Runtime-discovered command plugins for `warden`.
//!
//! Every immediate subdirectory of the plugin root (`<home>/cmdplugin`)
//! becomes a CLI subcommand named after the directory. Invoking the command
//! executes `<dir>/run` with the remaining arguments passed verbatim, the
//! caller's standard streams inherited and the plugin directory as the
//! working directory. The environment is extended with the resolved daemon
//! address, the plugin name and the path of the invoking executable so the
//! plugin can call back into `warden`.
//!
//! Plugins never speak the daemon protocol through this crate: the CLI hands
//! control to the external process and reports its exit status.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//! use warden_plugins::{PluginEnvironment, PluginRegistry, PluginRunner};
//! use warden_plugins::process::ProcessExecutor;
//!
//! let registry = PluginRegistry::discover(Path::new("/home/me/.warden/cmdplugin"));
//! let environment = PluginEnvironment::new(
//!     "unix:///home/me/.warden/warden.sock",
//!     PathBuf::from("/usr/local/bin/warden"),
//! );
//! let runner = PluginRunner::new(registry, environment, ProcessExecutor);
//! // runner.run("deploy", &["--dry-run".into()]) would exec the plugin.
//! ```

pub mod descriptor;
pub mod environment;
pub mod error;
pub mod process;
pub mod registry;
pub mod runner;

#[cfg(test)]
mod tests;

pub use self::descriptor::{ENTRY_POINT, PluginDescriptor};
pub use self::environment::{
    ENV_PLUGIN_NAME, ENV_PROGRAM, ENV_SERVER_ADDR, PluginEnvironment,
};
pub use self::error::PluginError;
pub use self::registry::PluginRegistry;
pub use self::runner::{PluginExecutor, PluginRunner};
