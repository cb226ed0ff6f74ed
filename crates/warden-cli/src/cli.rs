//! The command table: built-in subcommands plus discovered plugins.
//!
//! Plugins are registered in a single pass before parsing. The resulting
//! [`clap::Command`] is immutable for the rest of the invocation.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use clap::{Arg, ArgAction, ArgMatches, Args, CommandFactory, FromArgMatches, Parser, value_parser};
use tracing::warn;
use warden_config::LogFormat;
use warden_plugins::PluginRegistry;

use crate::commands::Command;

const PLUGIN_ARGS: &str = "args";
const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    about = "Supervise long-running programs through a background daemon",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(flatten)]
    _global: GlobalArgs,
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Configuration flags, listed here so they appear in `--help`.
///
/// They are consumed by the configuration loader before parsing and must
/// precede the subcommand.
#[derive(Args, Debug, Default)]
#[expect(
    dead_code,
    reason = "values are read by the configuration loader, not from clap"
)]
pub(crate) struct GlobalArgs {
    /// TOML file with configuration overrides [env: WARDEN_CONFIG_PATH].
    #[arg(long, value_name = "PATH")]
    config_path: Option<Utf8PathBuf>,
    /// Home directory holding the socket, program list, logs and plugins
    /// [env: WARDEN_HOME].
    #[arg(long, value_name = "DIR")]
    home: Option<Utf8PathBuf>,
    /// Daemon address, such as unix:///path/warden.sock or
    /// tcp://127.0.0.1:9779 [env: WARDEN_SERVER_ADDR].
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
    /// Enables debug logging [env: WARDEN_DEBUG].
    #[arg(short, long)]
    debug: bool,
    /// Diagnostics format on stderr: compact or json [env: WARDEN_LOG_FORMAT].
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

/// What the user asked for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Invocation {
    Builtin(Command),
    Plugin { name: String, args: Vec<OsString> },
}

/// Built-in commands merged with the discovered plugins.
pub(crate) struct CommandTable {
    command: clap::Command,
    registry: PluginRegistry,
    shadowed: Vec<String>,
}

impl CommandTable {
    /// Registers one subcommand per plugin. Plugins named like a built-in
    /// command or alias are dropped from `registry`.
    pub(crate) fn build(mut registry: PluginRegistry) -> Self {
        let mut command = Cli::command();
        let names: Vec<String> = registry
            .iter()
            .map(|plugin| plugin.name().to_owned())
            .collect();
        let mut shadowed = Vec::new();
        for name in names {
            if command.find_subcommand(&name).is_some() || name == "help" {
                registry.remove(&name);
                shadowed.push(name);
                continue;
            }
            command = command.subcommand(plugin_command(name));
        }
        Self {
            command,
            registry,
            shadowed,
        }
    }

    /// Plugins that survived registration.
    pub(crate) const fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Logs the plugins hidden by built-in commands.
    pub(crate) fn warn_shadowed(&self) {
        for name in &self.shadowed {
            warn!(
                target: CLI_TARGET,
                plugin = %name,
                "plugin ignored: the name belongs to a built-in command"
            );
        }
    }

    /// Parses the command tokens, starting with the program name.
    pub(crate) fn parse(&self, args: Vec<OsString>) -> Result<Invocation, clap::Error> {
        let matches = self.command.clone().try_get_matches_from(args)?;
        if let Some((name, sub)) = matches.subcommand()
            && self.registry.get(name).is_some()
        {
            return Ok(Invocation::Plugin {
                name: name.to_owned(),
                args: plugin_arguments(sub),
            });
        }
        Cli::from_arg_matches(&matches).map(|cli| Invocation::Builtin(cli.command))
    }
}

fn plugin_command(name: String) -> clap::Command {
    clap::Command::new(name)
        .about("Plugin command")
        .disable_help_flag(true)
        .arg(
            Arg::new(PLUGIN_ARGS)
                .action(ArgAction::Append)
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .value_parser(value_parser!(OsString)),
        )
}

fn plugin_arguments(matches: &ArgMatches) -> Vec<OsString> {
    matches
        .get_many::<OsString>(PLUGIN_ARGS)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}
