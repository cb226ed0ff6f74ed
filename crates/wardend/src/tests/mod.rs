//! Daemon-level test suites and the helpers they share.


use std::io::BufReader;
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tempfile::TempDir;

use warden_config::{Config, DaemonEndpoint, Settings};
use warden_rpc::{FrameReader, FrameWriter, ProgramInfo, ProgramStatus, Reply, Request};

use crate::Daemon;

/// Temporary warden home with settings pointing at a chosen endpoint.
pub(crate) struct TestHome {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl TestHome {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        Self { _dir: dir, root }
    }

    pub(crate) fn root(&self) -> &camino::Utf8Path {
        &self.root
    }

    /// Settings for a daemon listening on `addr`, or on the home socket when
    /// `addr` is `None`.
    pub(crate) fn settings(&self, addr: Option<&str>) -> Settings {
        let config = Config {
            home: Some(self.root.clone()),
            server_addr: addr.map(str::to_owned),
            ..Config::default()
        };
        Settings::from_config(&config).expect("resolve settings")
    }

    pub(crate) fn start(&self, addr: Option<&str>) -> Daemon {
        Daemon::start(&self.settings(addr)).expect("start daemon")
    }
}

/// Blocking JSONL client over either transport.
pub(crate) struct TestClient {
    reader: FrameReader<BufReader<Box<dyn std::io::Read + Send>>>,
    writer: FrameWriter<Box<dyn std::io::Write + Send>>,
}

impl TestClient {
    pub(crate) fn connect(endpoint: &DaemonEndpoint) -> Self {
        match endpoint {
            DaemonEndpoint::Unix { path } => {
                let stream = UnixStream::connect(path).expect("connect unix");
                let read = stream.try_clone().expect("clone stream");
                Self::from_halves(Box::new(read), Box::new(stream))
            }
            DaemonEndpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).expect("connect tcp");
                let read = stream.try_clone().expect("clone stream");
                Self::from_halves(Box::new(read), Box::new(stream))
            }
        }
    }

    fn from_halves(
        read: Box<dyn std::io::Read + Send>,
        write: Box<dyn std::io::Write + Send>,
    ) -> Self {
        Self {
            reader: FrameReader::new(BufReader::new(read)),
            writer: FrameWriter::new(write),
        }
    }

    pub(crate) fn send(&mut self, request: &Request) {
        self.writer.write_frame(request).expect("send request");
    }

    pub(crate) fn next(&mut self) -> Option<Reply> {
        self.reader.read_frame().expect("read reply")
    }

    pub(crate) fn call(&mut self, request: &Request) -> Reply {
        self.send(request);
        self.next().expect("reply before close")
    }

    pub(crate) fn status(&mut self) -> Vec<ProgramStatus> {
        match self.call(&Request::Status) {
            Reply::Status { programs } => programs,
            other => panic!("unexpected status reply: {other:?}"),
        }
    }
}

pub(crate) fn shell_program(name: &str, script: &str) -> ProgramInfo {
    ProgramInfo {
        name: name.to_owned(),
        directory: "/".to_owned(),
        command: vec!["/bin/sh".to_owned(), "-c".to_owned(), script.to_owned()],
        environ: Vec::new(),
    }
}

/// Polls `condition` for up to five seconds.
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    condition()
}
