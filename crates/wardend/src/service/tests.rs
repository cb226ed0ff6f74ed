//! Unit tests for the RPC service over in-memory socket pairs.

use std::fs::OpenOptions;
use std::io::{BufReader, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc::Receiver;
use std::thread;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use warden_rpc::{MAX_FRAME_BYTES, NameRequest, ProgramInfo, ProgramState, TailRequest};

use super::*;
use crate::process::{ShutdownCause, shutdown_channel};
use crate::store::ProgramStore;

struct Harness {
    _home: TempDir,
    log_dir: Utf8PathBuf,
    service: Arc<RpcService>,
    shutdown: Receiver<ShutdownCause>,
    stopping: Arc<AtomicBool>,
}

impl Harness {
    fn connect(&self) -> Client {
        let (server, client) = UnixStream::pair().expect("socket pair");
        let service = Arc::clone(&self.service);
        thread::spawn(move || service.handle(ConnectionStream::Unix(server)));
        Client {
            reader: FrameReader::new(BufReader::new(client.try_clone().expect("clone"))),
            writer: FrameWriter::new(client),
        }
    }

    fn append_log(&self, name: &str, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_dir.join(format!("{name}.log")))
            .expect("open log");
        file.write_all(text.as_bytes()).expect("append log");
    }
}

struct Client {
    reader: FrameReader<BufReader<UnixStream>>,
    writer: FrameWriter<UnixStream>,
}

impl Client {
    fn send(&mut self, request: &Request) {
        self.writer.write_frame(request).expect("send request");
    }

    fn next(&mut self) -> Option<Reply> {
        self.reader.read_frame().expect("read reply")
    }

    fn call(&mut self, request: &Request) -> Reply {
        self.send(request);
        self.next().expect("reply before close")
    }

    fn lines_until_end(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.next() {
                Some(Reply::Line { line }) => lines.push(line),
                Some(Reply::End) => return lines,
                other => panic!("unexpected tail frame: {other:?}"),
            }
        }
    }
}

fn stopped_program(name: &str) -> ProgramInfo {
    ProgramInfo {
        name: name.to_owned(),
        directory: "/".to_owned(),
        command: vec!["/bin/sh".to_owned(), "-c".to_owned(), "exec sleep 30".to_owned()],
        environ: Vec::new(),
    }
}

#[fixture]
fn harness() -> Harness {
    let home = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(home.path().to_path_buf()).expect("utf8 temp dir");
    let log_dir = root.join("logs");
    std::fs::create_dir(&log_dir).expect("create logs");
    let store = ProgramStore::new(root.join("programs.json"));
    store.save(&[stopped_program("web")]).expect("seed programs");

    let supervisor = Arc::new(Supervisor::open(store, &log_dir).expect("open supervisor"));
    let (trigger, shutdown) = shutdown_channel();
    let stopping = Arc::new(AtomicBool::new(false));
    let service = Arc::new(RpcService::new(supervisor, trigger, Arc::clone(&stopping)));
    Harness {
        _home: home,
        log_dir,
        service,
        shutdown,
        stopping,
    }
}

#[rstest]
fn version_reports_crate_version(harness: Harness) {
    let reply = harness.connect().call(&Request::Version);
    assert_eq!(reply, Reply::message(DAEMON_VERSION));
}

#[rstest]
fn one_connection_serves_sequential_requests(harness: Harness) {
    let mut client = harness.connect();
    let Reply::Status { programs } = client.call(&Request::Status) else {
        panic!("expected status reply");
    };
    assert_eq!(programs.len(), 1);
    assert_eq!(
        programs.first().map(|program| program.status),
        Some(ProgramState::Stopped)
    );
    assert_eq!(client.call(&Request::Version), Reply::message(DAEMON_VERSION));
}

#[rstest]
fn malformed_request_keeps_connection_open(harness: Harness) {
    let mut client = harness.connect();
    client
        .writer
        .get_mut()
        .write_all(b"{\"method\":\"launch\"}\n")
        .expect("write raw");
    let reply = client.next().expect("error reply");
    assert!(matches!(reply, Reply::Error { ref message } if message.starts_with("malformed request")));
    assert_eq!(client.call(&Request::Version), Reply::message(DAEMON_VERSION));
}

#[rstest]
fn oversized_request_closes_connection(harness: Harness) {
    let mut client = harness.connect();
    let mut payload = vec![b'x'; MAX_FRAME_BYTES + 16];
    payload.push(b'\n');
    // The daemon may hang up before the whole payload is written.
    drop(client.writer.get_mut().write_all(&payload));
    assert!(matches!(client.next(), Some(Reply::Error { .. })));
    assert_eq!(client.next(), None);
}

#[rstest]
fn unary_failures_are_reported_as_errors(harness: Harness) {
    let mut client = harness.connect();
    let reply = client.call(&Request::Stop(NameRequest::new("web")));
    assert_eq!(reply, Reply::error("program \"web\" is not running"));
    let reply = client.call(&Request::Start(NameRequest::new("ghost")));
    assert_eq!(reply, Reply::error("program \"ghost\" not found"));
}

#[rstest]
fn create_start_and_stop_reply_with_messages(harness: Harness) {
    let mut client = harness.connect();
    assert_eq!(
        client.call(&Request::Create(stopped_program("worker"))),
        Reply::message("program \"worker\" created")
    );
    assert_eq!(
        client.call(&Request::Stop(NameRequest::new("worker"))),
        Reply::message("program \"worker\" stopped")
    );
    assert_eq!(
        client.call(&Request::Start(NameRequest::new("worker"))),
        Reply::message("program \"worker\" started")
    );
    client.call(&Request::Stop(NameRequest::new("worker")));
}

#[rstest]
fn shutdown_replies_before_triggering(harness: Harness) {
    let reply = harness.connect().call(&Request::Shutdown);
    assert_eq!(reply, Reply::message("shutting down"));
    assert_eq!(harness.shutdown.recv().expect("cause"), ShutdownCause::Request);
    assert!(harness.stopping.load(Ordering::SeqCst));
}

#[rstest]
fn tail_sends_last_lines_then_end(harness: Harness) {
    harness.append_log("web", "one\ntwo\nthree\n");
    let mut client = harness.connect();
    client.send(&Request::Tail(TailRequest {
        name: "web".to_owned(),
        number: 2,
        follow: false,
    }));
    assert_eq!(client.lines_until_end(), vec!["two", "three"]);
}

#[rstest]
fn tail_splits_lines_longer_than_a_frame(harness: Harness) {
    let wide = "\u{e9}".repeat(MAX_FRAME_BYTES);
    let long = "x".repeat(2 * MAX_FRAME_BYTES);
    harness.append_log("web", &format!("first\n{wide}\n{long}\nlast\n"));
    let mut client = harness.connect();
    client.send(&Request::Tail(TailRequest {
        name: "web".to_owned(),
        number: 10,
        follow: false,
    }));

    let lines = client.lines_until_end();
    assert_eq!(lines.first().map(String::as_str), Some("first"));
    assert_eq!(lines.last().map(String::as_str), Some("last"));
    assert!(lines.iter().all(|line| !line.is_empty() && line.len() < MAX_FRAME_BYTES));
    let middle = lines.get(1..lines.len() - 1).expect("split lines").concat();
    assert_eq!(middle, format!("{wide}{long}"));
}

#[rstest]
fn tail_of_missing_log_is_empty(harness: Harness) {
    let mut client = harness.connect();
    client.send(&Request::Tail(TailRequest {
        name: "web".to_owned(),
        number: 10,
        follow: false,
    }));
    assert!(client.lines_until_end().is_empty());
}

#[rstest]
fn tail_of_unknown_program_is_an_error(harness: Harness) {
    let reply = harness.connect().call(&Request::Tail(TailRequest {
        name: "ghost".to_owned(),
        number: 10,
        follow: false,
    }));
    assert_eq!(reply, Reply::error("program \"ghost\" not found"));
}

#[rstest]
fn tail_follow_streams_appended_lines_until_daemon_stops(harness: Harness) {
    harness.append_log("web", "booted\n");
    let mut client = harness.connect();
    client.send(&Request::Tail(TailRequest {
        name: "web".to_owned(),
        number: 10,
        follow: true,
    }));
    assert_eq!(client.next(), Some(Reply::line("booted")));

    harness.append_log("web", "partial");
    harness.append_log("web", " line\nnext\n");
    assert_eq!(client.next(), Some(Reply::line("partial line")));
    assert_eq!(client.next(), Some(Reply::line("next")));

    harness.stopping.store(true, Ordering::SeqCst);
    assert_eq!(client.next(), Some(Reply::End));
}
