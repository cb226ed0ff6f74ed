//! Startup and shutdown sequencing for `wardend`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use warden_config::{DEFAULT_DAEMON_LOG_FILTER, DaemonEndpoint, Settings};

use crate::service::RpcService;
use crate::store::ProgramStore;
use crate::supervisor::Supervisor;
use crate::telemetry;
use crate::transport::{ListenerHandle, SocketListener};

use super::{
    LaunchError, PROCESS_TARGET, ShutdownCause, ShutdownTrigger, SignalWatcher, shutdown_channel,
};

/// How long shutdown waits for follow streams to send their final frame.
const FOLLOWER_DRAIN: Duration = Duration::from_secs(1);
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Runs the daemon in the foreground until a termination signal or a
/// `shutdown` call arrives, then stops every program and removes the socket.
pub fn run_daemon(settings: &Settings) -> Result<(), LaunchError> {
    telemetry::initialise(settings, DEFAULT_DAEMON_LOG_FILTER)?;
    let daemon = Daemon::start(settings)?;
    let signals = SignalWatcher::install(daemon.trigger())?;
    let cause = daemon.wait();
    info!(target: PROCESS_TARGET, %cause, "shutting down");
    signals.close();
    daemon.stop()
}

/// A daemon that is bound and serving requests.
pub struct Daemon {
    endpoint: DaemonEndpoint,
    local_addr: Option<SocketAddr>,
    supervisor: Arc<Supervisor>,
    listener: ListenerHandle,
    trigger: ShutdownTrigger,
    shutdown: Receiver<ShutdownCause>,
    stopping: Arc<AtomicBool>,
    followers: Arc<AtomicUsize>,
}

impl Daemon {
    /// Prepares the home directory, loads the program table and starts
    /// accepting connections on the configured endpoint.
    pub fn start(settings: &Settings) -> Result<Self, LaunchError> {
        let paths = settings.paths();
        paths.prepare()?;
        settings.endpoint().prepare_filesystem()?;

        let store = ProgramStore::new(paths.programs_path());
        let supervisor = Arc::new(Supervisor::open(store, paths.log_dir())?);
        let (trigger, shutdown) = shutdown_channel();
        let stopping = Arc::new(AtomicBool::new(false));

        let listener = SocketListener::bind(settings.endpoint())?;
        let local_addr = listener.local_addr();
        let service = RpcService::new(
            Arc::clone(&supervisor),
            trigger.clone(),
            Arc::clone(&stopping),
        );
        let followers = service.followers();
        let listener = listener.start(Arc::new(service))?;
        info!(
            target: PROCESS_TARGET,
            endpoint = %settings.endpoint(),
            home = %paths.home(),
            "daemon ready"
        );

        Ok(Self {
            endpoint: settings.endpoint().clone(),
            local_addr,
            supervisor,
            listener,
            trigger,
            shutdown,
            stopping,
            followers,
        })
    }

    /// The endpoint clients should dial, with an ephemeral TCP port
    /// replaced by the port actually bound.
    pub fn endpoint(&self) -> DaemonEndpoint {
        match self.local_addr {
            Some(addr) => DaemonEndpoint::tcp(addr.ip().to_string(), addr.port()),
            None => self.endpoint.clone(),
        }
    }

    /// Asks the daemon to shut down as if a client had called `shutdown`.
    pub fn request_shutdown(&self) {
        self.trigger.fire(ShutdownCause::Request);
    }

    pub(crate) fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Blocks until shutdown is requested.
    pub fn wait(&self) -> ShutdownCause {
        self.shutdown.recv().unwrap_or(ShutdownCause::Request)
    }

    /// Stops accepting connections, stops every running program and removes
    /// the Unix socket file.
    pub fn stop(self) -> Result<(), LaunchError> {
        self.stopping.store(true, Ordering::SeqCst);
        self.listener.shutdown();
        self.supervisor.stop_all();
        drain_followers(&self.followers);
        self.listener.join()?;
        info!(target: PROCESS_TARGET, "daemon stopped");
        Ok(())
    }
}

fn drain_followers(followers: &AtomicUsize) {
    let deadline = Instant::now() + FOLLOWER_DRAIN;
    while followers.load(Ordering::SeqCst) > 0 {
        if Instant::now() >= deadline {
            warn!(
                target: PROCESS_TARGET,
                remaining = followers.load(Ordering::SeqCst),
                "follow streams still open at shutdown"
            );
            return;
        }
        thread::sleep(DRAIN_POLL);
    }
}
