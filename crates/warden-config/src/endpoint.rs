use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::home::absolutize;

/// Bytes escaped when a socket path is rendered into a `unix://` URL.
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Address family used to reach the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Local Unix domain socket.
    UnixSocket,
    /// TCP network address.
    Network,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnixSocket => formatter.write_str("unix-socket"),
            Self::Network => formatter.write_str("network"),
        }
    }
}

/// Where the daemon listens and where clients dial.
///
/// The textual form accepted by [`FromStr`] is either a URL
/// (`unix:///path/to/warden.sock`, `tcp://127.0.0.1:9779`), a bare
/// `host:port` pair, or a bare filesystem path containing a `/`. Bare relative
/// paths resolve against the current directory. [`Display`] always renders
/// the percent-encoded URL form, which parses back to the same endpoint.
///
/// [`Display`]: fmt::Display
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum DaemonEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint.
    Tcp { host: String, port: u16 },
}

impl DaemonEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Reports which address family the endpoint uses.
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        match self {
            Self::Unix { .. } => TransportKind::UnixSocket,
            Self::Tcp { .. } => TransportKind::Network,
        }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Ensures the socket's parent directory exists with restrictive permissions.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(
                formatter,
                "unix://{}",
                utf8_percent_encode(path.as_str(), PATH_ESCAPES)
            ),
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for DaemonEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EndpointParseError::Empty);
        }
        if trimmed.contains("://") {
            return parse_url(trimmed);
        }
        if trimmed.contains('/') {
            return absolutize(Utf8Path::new(trimmed))
                .map(Self::unix)
                .map_err(|source| EndpointParseError::ResolvePath {
                    path: trimmed.to_owned(),
                    source,
                });
        }
        parse_host_port(trimmed)
    }
}

fn parse_url(input: &str) -> Result<DaemonEndpoint, EndpointParseError> {
    if let Some((scheme, rest)) = input.split_once("://")
        && scheme.eq_ignore_ascii_case("unix")
    {
        return parse_unix_url(input, rest);
    }
    let url = Url::parse(input)?;
    match url.scheme() {
        "tcp" => {
            let host = url
                .host_str()
                .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
            let port = url
                .port()
                .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
            Ok(DaemonEndpoint::tcp(strip_brackets(host), port))
        }
        other => Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
    }
}

// Decoded by hand: URL parsing would collapse `..` segments in the path.
fn parse_unix_url(input: &str, rest: &str) -> Result<DaemonEndpoint, EndpointParseError> {
    if rest.is_empty() || rest == "/" {
        return Err(EndpointParseError::MissingUnixPath(input.to_owned()));
    }
    if !rest.starts_with('/') {
        return Err(EndpointParseError::UnixHost(input.to_owned()));
    }
    let path = percent_decode_str(rest)
        .decode_utf8()
        .map_err(|_| EndpointParseError::NonUtf8Path(input.to_owned()))?;
    Ok(DaemonEndpoint::unix(path.into_owned()))
}

fn parse_host_port(input: &str) -> Result<DaemonEndpoint, EndpointParseError> {
    let Some((host, port)) = input.rsplit_once(':') else {
        return Err(EndpointParseError::MissingPort(input.to_owned()));
    };
    let host = strip_brackets(host);
    if host.is_empty() {
        return Err(EndpointParseError::MissingHost(input.to_owned()));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| EndpointParseError::InvalidPort(input.to_owned()))?;
    Ok(DaemonEndpoint::tcp(host, port))
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host)
}

/// Errors encountered while parsing a [`DaemonEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// The address was blank.
    #[error("daemon address is empty")]
    Empty,
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// TCP port was not a valid 16-bit number.
    #[error("invalid TCP port in '{0}'")]
    InvalidPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// A `unix://` URL named a host, so its path would lose a component.
    #[error("Unix socket URL '{0}' names a host; use unix:///absolute/path")]
    UnixHost(String),
    /// A relative socket path could not be resolved against the current
    /// directory.
    #[error("failed to resolve Unix socket path '{path}': {source}")]
    ResolvePath {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Unix socket path did not decode to UTF-8.
    #[error("Unix socket path in '{0}' is not valid UTF-8")]
    NonUtf8Path(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Parent directory is missing when creating a Unix socket path.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Failed to create or adjust socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn display_unix_socket() {
        let endpoint = DaemonEndpoint::unix(Utf8PathBuf::from("/tmp/warden.sock"));
        assert_eq!(endpoint.to_string(), "unix:///tmp/warden.sock");
    }

    #[rstest]
    #[case("tcp://127.0.0.1:9000", DaemonEndpoint::tcp("127.0.0.1", 9000))]
    #[case("127.0.0.1:9000", DaemonEndpoint::tcp("127.0.0.1", 9000))]
    #[case("localhost:11313", DaemonEndpoint::tcp("localhost", 11313))]
    #[case("[::1]:9000", DaemonEndpoint::tcp("::1", 9000))]
    #[case("tcp://[::1]:9000", DaemonEndpoint::tcp("::1", 9000))]
    #[case("unix:///run/warden.sock", DaemonEndpoint::unix("/run/warden.sock"))]
    #[case("/home/me/.warden/warden.sock", DaemonEndpoint::unix("/home/me/.warden/warden.sock"))]
    #[case("unix:///tmp/a%23b/warden.sock", DaemonEndpoint::unix("/tmp/a#b/warden.sock"))]
    fn parses_accepted_forms(#[case] input: &str, #[case] expected: DaemonEndpoint) {
        let endpoint: DaemonEndpoint = input.parse().expect("address should parse");
        assert_eq!(endpoint, expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("localhost")]
    #[case("localhost:http")]
    #[case(":9000")]
    #[case("http://localhost:80")]
    #[case("tcp://localhost")]
    #[case("unix://")]
    #[case("unix://run/warden.sock")]
    #[case("unix:///tmp/%ff.sock")]
    fn rejects_invalid_forms(#[case] input: &str) {
        assert!(
            input.parse::<DaemonEndpoint>().is_err(),
            "expected {input:?} to be rejected"
        );
    }

    #[rstest]
    #[case(DaemonEndpoint::unix("/tmp/with space/warden.sock"))]
    #[case(DaemonEndpoint::unix("/tmp/a#b/warden.sock"))]
    #[case(DaemonEndpoint::unix("/tmp/100%41/warden.sock"))]
    #[case(DaemonEndpoint::unix("/tmp/q?x/warden.sock"))]
    #[case(DaemonEndpoint::unix("/tmp/caf\u{e9}/warden.sock"))]
    #[case(DaemonEndpoint::unix("/tmp/up/../warden.sock"))]
    #[case(DaemonEndpoint::tcp("::1", 7000))]
    #[case(DaemonEndpoint::tcp("example.org", 7000))]
    fn display_form_parses_back(#[case] endpoint: DaemonEndpoint) {
        let reparsed: DaemonEndpoint = endpoint.to_string().parse().expect("reparse");
        assert_eq!(reparsed, endpoint);
    }

    #[rstest]
    #[case("./warden.sock", "warden.sock")]
    #[case("run/warden.sock", "run/warden.sock")]
    fn relative_paths_resolve_against_current_dir(#[case] input: &str, #[case] joined: &str) {
        let cwd = std::env::current_dir().expect("current dir");
        let endpoint: DaemonEndpoint = input.parse().expect("address should parse");
        let path = endpoint.unix_path().expect("unix endpoint");
        assert_eq!(path.as_std_path(), cwd.join(joined));

        let reparsed: DaemonEndpoint = endpoint.to_string().parse().expect("reparse");
        assert_eq!(reparsed, endpoint);
    }

    #[test]
    fn reports_transport_kind() {
        assert_eq!(
            DaemonEndpoint::unix("/tmp/a.sock").transport_kind(),
            TransportKind::UnixSocket
        );
        assert_eq!(
            DaemonEndpoint::tcp("127.0.0.1", 1).transport_kind(),
            TransportKind::Network
        );
    }

    #[test]
    fn prepare_filesystem_creates_parent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("nested").join("warden.sock");
        let endpoint = DaemonEndpoint::unix(socket.to_str().expect("utf8 path"));
        endpoint.prepare_filesystem().expect("prepare socket dir");
        assert!(dir.path().join("nested").is_dir());
    }
}
