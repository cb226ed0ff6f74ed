//! Configuration loading helpers for the warden CLI.
//!
//! Global configuration flags must precede the subcommand. The logic here
//! peels them off the front of the argument list so `ortho_config` only sees
//! flags it understands, while the command table parses the remaining tokens.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use warden_config::Config;

use crate::AppError;

/// A configuration flag recognised ahead of the subcommand.
#[derive(Debug, Clone, Copy)]
struct ConfigFlag {
    long: &'static str,
    short: Option<&'static str>,
    takes_value: bool,
}

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of [`Config`] and with
/// [`crate::cli::GlobalArgs`], which documents them in `--help`.
const CONFIG_FLAGS: &[ConfigFlag] = &[
    ConfigFlag {
        long: "--config-path",
        short: None,
        takes_value: true,
    },
    ConfigFlag {
        long: "--home",
        short: None,
        takes_value: true,
    },
    ConfigFlag {
        long: "--addr",
        short: None,
        takes_value: true,
    },
    ConfigFlag {
        long: "--log-format",
        short: None,
        takes_value: true,
    },
    ConfigFlag {
        long: "--debug",
        short: Some("-d"),
        takes_value: false,
    },
];

pub(crate) trait ConfigLoader {
    /// Loads configuration for the CLI from the leading configuration flags.
    ///
    /// `args` starts with the program name, as `ortho_config` expects.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Loads the layered configuration through `ortho_config`.
pub(crate) struct OrthoConfigLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

impl OrthoConfigLoader {
    fn process_config_flag(argument: &OsStr) -> FlagAction {
        let argument_text = argument.to_string_lossy();
        if !argument_text.starts_with('-') || argument_text == "--" {
            return FlagAction::Skip;
        }

        let (flag, has_inline_value) = match argument_text.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (argument_text.as_ref(), false),
        };

        CONFIG_FLAGS
            .iter()
            .find(|known| known.long == flag || known.short == Some(flag))
            .map_or(FlagAction::Skip, |known| FlagAction::Include {
                needs_value: known.takes_value && !has_inline_value,
            })
    }
}

pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

/// Splits `args` into the configuration prefix and the index where the
/// command tokens begin.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some(program) = args.first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut filtered: Vec<OsString> = vec![program.clone()];
    let mut command_start = 1usize;
    let mut pending_value = false;

    for argument in args.iter().skip(1) {
        if pending_value {
            filtered.push(argument.clone());
            pending_value = false;
            command_start += 1;
            continue;
        }

        match OrthoConfigLoader::process_config_flag(argument.as_os_str()) {
            FlagAction::Include { needs_value } => {
                filtered.push(argument.clone());
                command_start += 1;
                pending_value = needs_value;
            }
            FlagAction::Skip => break,
        }
    }

    ConfigArgumentSplit {
        config_arguments: filtered,
        command_start,
    }
}
