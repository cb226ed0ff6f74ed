//! JSONL request handling for accepted connections.
//!
//! Each connection carries any number of sequential requests. Unary requests
//! get exactly one reply; `tail` streams `line` replies and finishes with
//! `end`. A malformed request is answered with an error and the connection
//! stays open; an oversized one closes it because the rest of the line can
//! no longer be framed.

mod tail;

use std::io::{self, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, warn};

use warden_rpc::{FrameError, FrameReader, FrameWriter, Reply, Request};

use crate::process::{ShutdownCause, ShutdownTrigger};
use crate::supervisor::{Supervisor, SupervisorError};
use crate::transport::{ConnectionHandler, ConnectionStream};

pub(crate) const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Version reported by the `version` call.
pub const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

type Reader = FrameReader<BufReader<ConnectionStream>>;
type Writer = FrameWriter<ConnectionStream>;

/// Serves the RPC surface on top of a [`Supervisor`].
pub(crate) struct RpcService {
    supervisor: Arc<Supervisor>,
    shutdown: ShutdownTrigger,
    stopping: Arc<AtomicBool>,
    followers: Arc<AtomicUsize>,
}

impl RpcService {
    pub(crate) fn new(
        supervisor: Arc<Supervisor>,
        shutdown: ShutdownTrigger,
        stopping: Arc<AtomicBool>,
    ) -> Self {
        Self {
            supervisor,
            shutdown,
            stopping,
            followers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `tail --follow` streams still open.
    pub(crate) fn followers(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.followers)
    }

    fn serve(&self, stream: ConnectionStream) -> Result<(), FrameError> {
        let mut reader = FrameReader::new(BufReader::new(stream.try_clone()?));
        let mut writer = FrameWriter::new(stream);
        loop {
            match reader.read_frame::<Request>() {
                Ok(Some(request)) => {
                    debug!(target: SERVICE_TARGET, method = request.method(), "request received");
                    self.respond(request, &mut reader, &mut writer)?;
                }
                Ok(None) => return Ok(()),
                Err(FrameError::Decode(error)) => {
                    writer.write_frame(&Reply::error(format!("malformed request: {error}")))?;
                }
                Err(error @ FrameError::TooLarge { .. }) => {
                    writer.write_frame(&Reply::error(error.to_string()))?;
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn respond(
        &self,
        request: Request,
        reader: &mut Reader,
        writer: &mut Writer,
    ) -> Result<(), FrameError> {
        let reply = match request {
            Request::Status => Reply::Status {
                programs: self.supervisor.status(),
            },
            Request::Create(info) => {
                let name = info.name.clone();
                unary(self.supervisor.create(info), || {
                    format!("program \"{name}\" created")
                })
            }
            Request::Start(target) => unary(self.supervisor.start(&target.name), || {
                format!("program \"{}\" started", target.name)
            }),
            Request::Stop(target) => unary(self.supervisor.stop(&target.name), || {
                format!("program \"{}\" stopped", target.name)
            }),
            Request::Tail(tail) => {
                let state = tail::FollowState {
                    stopping: &self.stopping,
                    followers: &self.followers,
                };
                return tail::stream(&self.supervisor, &state, &tail, reader, writer);
            }
            Request::Shutdown => {
                writer.write_frame(&Reply::message("shutting down"))?;
                self.stopping.store(true, Ordering::SeqCst);
                self.shutdown.fire(ShutdownCause::Request);
                return Ok(());
            }
            Request::Version => Reply::message(DAEMON_VERSION),
        };
        writer.write_frame(&reply)
    }
}

impl ConnectionHandler for RpcService {
    fn handle(&self, stream: ConnectionStream) {
        match self.serve(stream) {
            Ok(()) => debug!(target: SERVICE_TARGET, "connection closed"),
            Err(FrameError::Io(error))
                if matches!(
                    error.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                ) =>
            {
                debug!(target: SERVICE_TARGET, %error, "client hung up");
            }
            Err(error) => warn!(target: SERVICE_TARGET, %error, "connection closed with error"),
        }
    }
}

fn unary(result: Result<(), SupervisorError>, message: impl FnOnce() -> String) -> Reply {
    match result {
        Ok(()) => Reply::message(message()),
        Err(error) => Reply::error(error.to_string()),
    }
}

#[cfg(test)]
mod tests;
