//! Resolution of the layered [`Config`] into immutable runtime [`Settings`].

use std::fs;
use std::io;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::DEBUG_LOG_FILTER;
use crate::home::absolutize;
use crate::{Config, DaemonEndpoint, EndpointParseError, HomePaths, LogFormat};

/// Contents of `<home>/warden.json`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfigFile {
    /// Server section; absent sections behave like an empty one.
    #[serde(default)]
    pub server: ServerSection,
}

/// The `server` table of `warden.json`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerSection {
    /// Address the daemon listens on and clients dial.
    #[serde(default)]
    pub addr: Option<String>,
}

impl ServerConfigFile {
    /// Reads the server configuration, returning `None` when the file is absent.
    pub fn read(path: &camino::Utf8Path) -> Result<Option<Self>, SettingsError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::ReadServerConfig {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SettingsError::ParseServerConfig {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Immutable runtime settings resolved once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    paths: HomePaths,
    endpoint: DaemonEndpoint,
    debug: bool,
    log_format: LogFormat,
}

impl Settings {
    /// Resolves settings from the layered configuration.
    ///
    /// The endpoint comes from the first layer that sets it: the configured
    /// override, then `server.addr` in `warden.json`, then the socket in the
    /// home directory. A relative home resolves against the current
    /// directory so the default socket renders as an absolute URL.
    pub fn from_config(config: &Config) -> Result<Self, SettingsError> {
        let home = config.home_dir();
        let home = absolutize(&home).map_err(|source| SettingsError::ResolveHome {
            path: home.clone(),
            source,
        })?;
        let paths = HomePaths::new(home);
        let endpoint = resolve_endpoint(config, &paths)?;
        Ok(Self {
            paths,
            endpoint,
            debug: config.debug(),
            log_format: config.log_format(),
        })
    }

    /// Home directory layout.
    #[must_use]
    pub const fn paths(&self) -> &HomePaths {
        &self.paths
    }

    /// Endpoint the daemon binds and clients dial.
    #[must_use]
    pub const fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    /// Whether debug logging is enabled.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Logging output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Log filter to install, given the binary's non-debug default.
    #[must_use]
    pub const fn log_filter(&self, default_filter: &'static str) -> &'static str {
        if self.debug {
            DEBUG_LOG_FILTER
        } else {
            default_filter
        }
    }
}

fn resolve_endpoint(
    config: &Config,
    paths: &HomePaths,
) -> Result<DaemonEndpoint, SettingsError> {
    if let Some(addr) = config.server_addr() {
        return parse_addr(addr);
    }
    let configured = ServerConfigFile::read(paths.server_config_path())?
        .and_then(|file| file.server.addr)
        .filter(|addr| !addr.trim().is_empty());
    if let Some(addr) = configured {
        return parse_addr(&addr);
    }
    Ok(DaemonEndpoint::unix(paths.socket_path()))
}

fn parse_addr(addr: &str) -> Result<DaemonEndpoint, SettingsError> {
    addr.parse()
        .map_err(|source| SettingsError::InvalidAddress {
            addr: addr.to_owned(),
            source,
        })
}

/// Errors raised while resolving [`Settings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The configured daemon address could not be parsed.
    #[error("invalid daemon address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: EndpointParseError,
    },
    /// A relative home directory could not be made absolute.
    #[error("failed to resolve home directory '{path}': {source}")]
    ResolveHome {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// `warden.json` exists but could not be read.
    #[error("failed to read server configuration '{path}': {source}")]
    ReadServerConfig {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// `warden.json` is not valid JSON for the expected shape.
    #[error("failed to parse server configuration '{path}': {source}")]
    ParseServerConfig {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
