//! Request and reply payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of log lines sent by `tail` when the caller does not specify one.
pub const DEFAULT_TAIL_LINES: usize = 10;

/// A remote operation requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    /// Lists every supervised program.
    Status,
    /// Registers, persists and starts a new program.
    Create(ProgramInfo),
    /// Starts a stopped or exited program.
    Start(NameRequest),
    /// Stops a running program.
    Stop(NameRequest),
    /// Streams the tail of a program's log.
    Tail(TailRequest),
    /// Stops every program and terminates the daemon.
    Shutdown,
    /// Reports the daemon version.
    Version,
}

impl Request {
    /// Short operation name used in diagnostics.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Create(_) => "create",
            Self::Start(_) => "start",
            Self::Stop(_) => "stop",
            Self::Tail(_) => "tail",
            Self::Shutdown => "shutdown",
            Self::Version => "version",
        }
    }
}

/// A frame sent by the daemon in answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// Program table snapshot answering [`Request::Status`].
    Status {
        /// One entry per supervised program, ordered by name.
        programs: Vec<ProgramStatus>,
    },
    /// Human-readable outcome of a unary call.
    Message {
        /// Text printed verbatim by the client.
        message: String,
    },
    /// One log line streamed by `tail`.
    Line {
        /// Line contents without the trailing newline.
        line: String,
    },
    /// Terminates a `tail` stream.
    End,
    /// The daemon rejected the call.
    Error {
        /// Failure description.
        message: String,
    },
}

impl Reply {
    /// Builds a [`Reply::Message`].
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Builds a [`Reply::Error`].
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Builds a [`Reply::Line`].
    #[must_use]
    pub fn line(line: impl Into<String>) -> Self {
        Self::Line { line: line.into() }
    }

    /// Discriminant name used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Message { .. } => "message",
            Self::Line { .. } => "line",
            Self::End => "end",
            Self::Error { .. } => "error",
        }
    }
}

/// Definition of a supervised program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInfo {
    /// Unique program name.
    pub name: String,
    /// Working directory the program starts in.
    pub directory: String,
    /// Executable followed by its arguments.
    pub command: Vec<String>,
    /// Extra `KEY=VALUE` environment entries.
    #[serde(default)]
    pub environ: Vec<String>,
}

/// Payload naming a single program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    /// Program name.
    pub name: String,
}

impl NameRequest {
    /// Wraps a program name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Payload for [`Request::Tail`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailRequest {
    /// Program name.
    pub name: String,
    /// Number of trailing lines to send before following.
    #[serde(default = "default_tail_lines")]
    pub number: usize,
    /// Keep streaming lines appended after the initial tail.
    #[serde(default)]
    pub follow: bool,
}

const fn default_tail_lines() -> usize {
    DEFAULT_TAIL_LINES
}

/// Lifecycle state of a supervised program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramState {
    /// The process is alive.
    Running,
    /// Never started, or stopped on request.
    Stopped,
    /// The process exited on its own.
    Exited,
    /// The process could not be spawned.
    Fatal,
}

impl ProgramState {
    /// Lower-case label used on the wire and in CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Exited => "exited",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ProgramState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One row of the status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStatus {
    /// Program name.
    pub name: String,
    /// Current state.
    pub status: ProgramState,
    /// `pid <n>`, `exit status <n>`, a spawn error, or empty.
    #[serde(default)]
    pub extra: String,
}
