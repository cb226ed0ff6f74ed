//! JSONL framing over blocking byte streams.
//!
//! [`FrameWriter`] serialises one value per line and flushes after each frame
//! so streaming replies reach the peer immediately. [`FrameReader`] reads one
//! line at a time, refusing lines longer than [`MAX_FRAME_BYTES`] before they
//! are buffered in full.

use std::io::{self, BufRead, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Largest accepted frame, excluding the newline delimiter.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading from or writing to the stream failed.
    #[error("transport I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The value could not be serialised.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    /// The line was not a valid JSON document of the expected shape.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    /// The frame exceeded [`MAX_FRAME_BYTES`].
    #[error("frame exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
}

/// Writes JSONL frames to a stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps an output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialises `value` as one line and flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Encode`] when serialisation fails,
    /// [`FrameError::TooLarge`] when the encoded frame exceeds the limit, or
    /// [`FrameError::Io`] when the write fails.
    pub fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<(), FrameError> {
        let mut encoded = serde_json::to_vec(value).map_err(FrameError::Encode)?;
        if encoded.len() > MAX_FRAME_BYTES {
            return Err(FrameError::TooLarge {
                limit: MAX_FRAME_BYTES,
            });
        }
        encoded.push(b'\n');
        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Returns a mutable reference to the wrapped stream.
    pub const fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

/// Reads JSONL frames from a buffered stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    limit: usize,
}

impl<R: BufRead> FrameReader<R> {
    /// Wraps a buffered input stream using [`MAX_FRAME_BYTES`] as the limit.
    pub const fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_FRAME_BYTES)
    }

    /// Wraps a buffered input stream with a custom frame limit.
    pub const fn with_limit(reader: R, limit: usize) -> Self {
        Self { reader, limit }
    }

    /// Returns a mutable reference to the wrapped stream.
    ///
    /// Bytes already buffered by the reader remain available to the next
    /// [`read_frame`](Self::read_frame) call.
    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Reads the next frame.
    ///
    /// Blank lines are skipped. Returns `Ok(None)` once the peer closes the
    /// stream between frames.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] when a line exceeds the limit,
    /// [`FrameError::Decode`] when it does not parse as `T`, or
    /// [`FrameError::Io`] when reading fails.
    pub fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_slice(trimmed)
                .map(Some)
                .map_err(FrameError::Decode);
        }
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let budget = u64::try_from(self.limit)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut buffer = Vec::new();
        let read = loop {
            match (&mut self.reader).take(budget).read_until(b'\n', &mut buffer) {
                Ok(read) => break read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(FrameError::Io(error)),
            }
        };
        if read == 0 {
            return Ok(None);
        }
        let content = buffer.strip_suffix(b"\n").unwrap_or(&buffer).len();
        if content > self.limit {
            return Err(FrameError::TooLarge { limit: self.limit });
        }
        Ok(Some(buffer))
    }
}
