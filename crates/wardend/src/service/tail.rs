//! Streaming of program log tails.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

use warden_rpc::{FrameError, MAX_FRAME_BYTES, Reply, TailRequest};

use super::{Reader, SERVICE_TARGET, Writer};
use crate::supervisor::Supervisor;
use crate::transport::ConnectionStream;

/// How long a follow loop waits on the client before rereading the log.
const FOLLOW_POLL: Duration = Duration::from_millis(200);
const SCAN_CHUNK: usize = 8 * 1024;
/// Longest run of log bytes sent in one [`Reply::Line`]. Longer lines are
/// split; the margin covers JSON escaping of control bytes.
const MAX_LINE_BYTES: usize = MAX_FRAME_BYTES / 8;

/// Daemon-wide flags consulted by follow loops.
pub(super) struct FollowState<'a> {
    pub(super) stopping: &'a AtomicBool,
    pub(super) followers: &'a AtomicUsize,
}

/// Keeps [`FollowState::followers`] accurate on every exit path.
struct FollowerGuard<'a>(&'a AtomicUsize);

impl<'a> FollowerGuard<'a> {
    fn enter(followers: &'a AtomicUsize) -> Self {
        followers.fetch_add(1, Ordering::SeqCst);
        Self(followers)
    }
}

impl Drop for FollowerGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sends the last lines of a program log, then keeps streaming appended
/// lines when `follow` is set. Finishes with [`Reply::End`] unless the
/// program is unknown or the client hung up.
pub(super) fn stream(
    supervisor: &Supervisor,
    state: &FollowState<'_>,
    request: &TailRequest,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<(), FrameError> {
    if let Err(error) = supervisor.ensure_exists(&request.name) {
        return writer.write_frame(&Reply::error(error.to_string()));
    }
    let mut cursor = LogCursor::default();
    match supervisor.open_log(&request.name) {
        Ok(Some(file)) => cursor.attach_at_tail(file, request.number)?,
        Ok(None) => {}
        Err(error) => return writer.write_frame(&Reply::error(error.to_string())),
    }
    cursor.drain(writer, !request.follow)?;
    if !request.follow {
        return writer.write_frame(&Reply::End);
    }

    debug!(target: SERVICE_TARGET, program = %request.name, "following log");
    let _guard = FollowerGuard::enter(state.followers);
    let connection = reader.get_mut();
    connection.get_ref().set_read_timeout(Some(FOLLOW_POLL))?;
    let outcome = follow(
        supervisor,
        state.stopping,
        request,
        &mut cursor,
        connection,
        writer,
    );
    connection.get_ref().set_read_timeout(None)?;
    match outcome? {
        Client::Closed => Ok(()),
        Client::Waiting | Client::Spoke => writer.write_frame(&Reply::End),
    }
}

/// What the client did while a follow loop was waiting on it.
enum Client {
    Waiting,
    Closed,
    Spoke,
}

fn follow(
    supervisor: &Supervisor,
    stopping: &AtomicBool,
    request: &TailRequest,
    cursor: &mut LogCursor,
    connection: &mut BufReader<ConnectionStream>,
    writer: &mut Writer,
) -> Result<Client, FrameError> {
    loop {
        if stopping.load(Ordering::SeqCst) {
            return Ok(Client::Waiting);
        }
        match poll_client(connection)? {
            Client::Waiting => {}
            other => return Ok(other),
        }
        if !cursor.is_attached()
            && let Ok(Some(file)) = supervisor.open_log(&request.name)
        {
            cursor.attach_at_start(file);
        }
        cursor.drain(writer, false)?;
    }
}

/// Waits up to the read timeout for the client. Inbound data means the
/// client has moved on; it stays buffered for the next request.
fn poll_client<R: BufRead>(connection: &mut R) -> io::Result<Client> {
    match connection.fill_buf() {
        Ok([]) => Ok(Client::Closed),
        Ok(_) => Ok(Client::Spoke),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(Client::Waiting)
        }
        Err(error) if error.kind() == io::ErrorKind::ConnectionReset => Ok(Client::Closed),
        Err(error) => Err(error),
    }
}

/// Read position inside a log file that may not exist yet.
#[derive(Default)]
struct LogCursor {
    file: Option<BufReader<File>>,
    position: u64,
    partial: Vec<u8>,
    /// The current line was already split, so a lone newline ends it.
    split: bool,
}

impl LogCursor {
    const fn is_attached(&self) -> bool {
        self.file.is_some()
    }

    fn attach_at_tail(&mut self, mut file: File, lines: usize) -> io::Result<()> {
        self.position = tail_offset(&mut file, lines)?;
        file.seek(SeekFrom::Start(self.position))?;
        self.file = Some(BufReader::new(file));
        Ok(())
    }

    fn attach_at_start(&mut self, file: File) {
        self.position = 0;
        self.split = false;
        self.file = Some(BufReader::new(file));
    }

    /// Sends every complete line written since the last drain. A trailing
    /// line without a newline is held back unless `flush_partial` is set.
    /// Lines longer than [`MAX_LINE_BYTES`] go out as several frames.
    fn drain(&mut self, writer: &mut Writer, flush_partial: bool) -> Result<(), FrameError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let length = file.get_ref().metadata()?.len();
        if length < self.position {
            // Truncated or rotated in place.
            file.seek(SeekFrom::Start(0))?;
            self.position = 0;
            self.partial.clear();
            self.split = false;
        }
        loop {
            let budget = MAX_LINE_BYTES.saturating_sub(self.partial.len()) as u64;
            let read = file
                .by_ref()
                .take(budget)
                .read_until(b'\n', &mut self.partial)?;
            if read == 0 {
                break;
            }
            self.position += read as u64;
            if self.partial.last() == Some(&b'\n') {
                if !(self.split && self.partial == b"\n") {
                    writer.write_frame(&Reply::line(render(&self.partial)))?;
                }
                self.partial.clear();
                self.split = false;
            } else if self.partial.len() >= MAX_LINE_BYTES {
                let rest = self.partial.split_off(complete_prefix(&self.partial));
                let chunk = String::from_utf8_lossy(&self.partial).into_owned();
                writer.write_frame(&Reply::line(chunk))?;
                self.partial = rest;
                self.split = true;
            }
        }
        if flush_partial && !self.partial.is_empty() {
            writer.write_frame(&Reply::line(render(&self.partial)))?;
            self.partial.clear();
            self.split = false;
        }
        Ok(())
    }
}

/// Length of `bytes` without a UTF-8 sequence cut off at the end.
fn complete_prefix(bytes: &[u8]) -> usize {
    let length = bytes.len();
    for back in 1..=length.min(4) {
        let Some(&byte) = bytes.get(length - back) else {
            break;
        };
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { length - back } else { length };
    }
    length
}

fn render(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Finds the byte offset where the last `lines` lines of `file` begin,
/// scanning backwards so large logs are not read in full.
fn tail_offset<F: Read + Seek>(file: &mut F, lines: usize) -> io::Result<u64> {
    let length = file.seek(SeekFrom::End(0))?;
    if lines == 0 || length == 0 {
        return Ok(length);
    }
    let mut chunk = vec![0_u8; SCAN_CHUNK];
    let mut end = length;
    let mut newlines = 0_usize;
    let last_byte = length - 1;
    while end > 0 {
        let step = usize::try_from(end).map_or(SCAN_CHUNK, |end| end.min(SCAN_CHUNK));
        let start = end - step as u64;
        let window = chunk.get_mut(..step).unwrap_or_default();
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(window)?;
        for (index, byte) in window.iter().enumerate().rev() {
            let offset = start + index as u64;
            if *byte != b'\n' || offset == last_byte {
                continue;
            }
            newlines += 1;
            if newlines == lines {
                return Ok(offset + 1);
            }
        }
        end = start;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::{complete_prefix, tail_offset};

    #[rstest]
    #[case::fewer_lines_than_requested("a\nb\n", 5, 0)]
    #[case::last_two("a\nb\nc\n", 2, 2)]
    #[case::unterminated_last_line("a\nb\nc", 1, 4)]
    #[case::zero_lines("a\nb\n", 0, 4)]
    #[case::empty("", 3, 0)]
    fn offsets_point_at_requested_lines(
        #[case] contents: &str,
        #[case] lines: usize,
        #[case] expected: u64,
    ) {
        let mut file = Cursor::new(contents.as_bytes().to_vec());
        assert_eq!(tail_offset(&mut file, lines).expect("scan"), expected);
    }

    #[rstest]
    #[case::ascii(b"abc".as_slice(), 3)]
    #[case::whole_two_byte_char("a\u{e9}".as_bytes(), 3)]
    #[case::cut_two_byte_char(&[b'a', 0xC3], 1)]
    #[case::cut_four_byte_char(&[b'a', 0xF0, 0x9F, 0x98], 1)]
    #[case::whole_four_byte_char("a\u{1F600}".as_bytes(), 5)]
    #[case::stray_continuation(&[0x80, 0x80, 0x80, 0x80, 0x80], 5)]
    fn complete_prefix_keeps_whole_characters(#[case] bytes: &[u8], #[case] expected: usize) {
        assert_eq!(complete_prefix(bytes), expected);
    }

    #[test]
    fn scans_across_chunk_boundaries() {
        let line = "x".repeat(1000);
        let contents: String = (0..40).map(|_| format!("{line}\n")).collect();
        let mut file = Cursor::new(contents.into_bytes());
        assert_eq!(tail_offset(&mut file, 3).expect("scan"), 37 * 1001);
    }
}
