//! Typed client facades over the daemon connection.
//!
//! One [`RpcChannel`] wraps the invocation's single connection. The
//! [`ProgramClient`] and [`SupervisorClient`] facades share it, so every
//! call made while handling a command travels over the same socket.

use std::cell::RefCell;
use std::io::{self, BufReader, Read, Write};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;
use warden_rpc::{
    FrameError, FrameReader, FrameWriter, NameRequest, ProgramInfo, ProgramStatus, Reply,
    Request, TailRequest,
};

use crate::transport::Connection;

const RPC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rpc");

/// Errors raised by remote calls.
#[derive(Debug, Error)]
pub(crate) enum RpcError {
    /// The daemon answered with an error reply.
    #[error("call failed: {message}")]
    Rejected { message: String },
    /// The daemon answered with a frame the call does not expect.
    #[error("unexpected response from daemon: '{method}' received '{kind}'")]
    Unexpected {
        method: &'static str,
        kind: &'static str,
    },
    /// The daemon sent something that is not a reply frame.
    #[error("unexpected response from daemon: {0}")]
    Malformed(#[source] FrameError),
    /// The connection closed before the call completed.
    #[error("daemon closed the connection during '{method}'")]
    Closed { method: &'static str },
    /// Reading or writing the connection failed.
    #[error("failed to exchange frames with daemon: {0}")]
    Transport(#[source] FrameError),
    /// Streamed output could not be forwarded.
    #[error("failed to write daemon output: {0}")]
    Output(#[source] io::Error),
}

impl From<FrameError> for RpcError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Decode(_) | FrameError::TooLarge { .. } => Self::Malformed(error),
            FrameError::Io(_) | FrameError::Encode(_) => Self::Transport(error),
        }
    }
}

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

/// Request/reply exchange over one connection.
pub(crate) struct RpcChannel {
    reader: FrameReader<BufReader<BoxedReader>>,
    writer: FrameWriter<BoxedWriter>,
}

impl RpcChannel {
    /// Splits `connection` into buffered read and write halves.
    pub(crate) fn open(connection: Connection) -> io::Result<Self> {
        let read_half = connection.try_clone()?;
        Ok(Self::from_halves(Box::new(read_half), Box::new(connection)))
    }

    pub(crate) fn from_halves(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader: FrameReader::new(BufReader::new(reader)),
            writer: FrameWriter::new(writer),
        }
    }

    fn send(&mut self, request: &Request) -> Result<(), RpcError> {
        debug!(target: RPC_TARGET, method = request.method(), "sending request");
        self.writer.write_frame(request).map_err(RpcError::from)
    }

    fn next(&mut self, method: &'static str) -> Result<Reply, RpcError> {
        self.reader
            .read_frame::<Reply>()?
            .ok_or(RpcError::Closed { method })
    }

    /// Sends `request` and returns its single reply. Error replies become
    /// [`RpcError::Rejected`].
    fn call(&mut self, request: &Request) -> Result<Reply, RpcError> {
        self.send(request)?;
        match self.next(request.method())? {
            Reply::Error { message } => Err(RpcError::Rejected { message }),
            reply => Ok(reply),
        }
    }

    fn call_for_message(&mut self, request: &Request) -> Result<String, RpcError> {
        match self.call(request)? {
            Reply::Message { message } => Ok(message),
            other => Err(RpcError::Unexpected {
                method: request.method(),
                kind: other.kind(),
            }),
        }
    }
}

/// Shared handle to the invocation's channel.
pub(crate) type SharedChannel = Rc<RefCell<RpcChannel>>;

/// Program table operations.
pub(crate) struct ProgramClient {
    channel: SharedChannel,
}

impl ProgramClient {
    pub(crate) const fn new(channel: SharedChannel) -> Self {
        Self { channel }
    }

    /// Lists every supervised program.
    pub(crate) fn status(&self) -> Result<Vec<ProgramStatus>, RpcError> {
        match self.channel.borrow_mut().call(&Request::Status)? {
            Reply::Status { programs } => Ok(programs),
            other => Err(RpcError::Unexpected {
                method: "status",
                kind: other.kind(),
            }),
        }
    }

    /// Registers and starts a program.
    pub(crate) fn create(&self, program: ProgramInfo) -> Result<String, RpcError> {
        self.channel
            .borrow_mut()
            .call_for_message(&Request::Create(program))
    }

    pub(crate) fn start(&self, name: &str) -> Result<String, RpcError> {
        self.channel
            .borrow_mut()
            .call_for_message(&Request::Start(NameRequest::new(name)))
    }

    pub(crate) fn stop(&self, name: &str) -> Result<String, RpcError> {
        self.channel
            .borrow_mut()
            .call_for_message(&Request::Stop(NameRequest::new(name)))
    }

    /// Streams a program's log tail, handing each line to `on_line` until
    /// the daemon sends `end`.
    pub(crate) fn tail<F>(&self, request: TailRequest, mut on_line: F) -> Result<(), RpcError>
    where
        F: FnMut(&str) -> io::Result<()>,
    {
        let mut channel = self.channel.borrow_mut();
        let request = Request::Tail(request);
        channel.send(&request)?;
        loop {
            match channel.next(request.method())? {
                Reply::Line { line } => on_line(&line).map_err(RpcError::Output)?,
                Reply::End => return Ok(()),
                Reply::Error { message } => return Err(RpcError::Rejected { message }),
                other => {
                    return Err(RpcError::Unexpected {
                        method: request.method(),
                        kind: other.kind(),
                    });
                }
            }
        }
    }
}

/// Daemon-wide operations.
pub(crate) struct SupervisorClient {
    channel: SharedChannel,
}

impl SupervisorClient {
    pub(crate) const fn new(channel: SharedChannel) -> Self {
        Self { channel }
    }

    /// Daemon version string.
    pub(crate) fn version(&self) -> Result<String, RpcError> {
        self.channel.borrow_mut().call_for_message(&Request::Version)
    }

    /// Asks the daemon to stop every program and exit.
    pub(crate) fn shutdown(&self) -> Result<String, RpcError> {
        self.channel
            .borrow_mut()
            .call_for_message(&Request::Shutdown)
    }
}
