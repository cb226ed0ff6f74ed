//! Wire protocol shared by the `warden` CLI and the `wardend` daemon.
//!
//! Messages travel as JSON Lines: one UTF-8 JSON document per line. A client
//! writes a [`Request`] and reads [`Reply`] frames until the call completes.
//! Unary calls receive exactly one reply; a `tail` call receives zero or more
//! [`Reply::Line`] frames terminated by [`Reply::End`] or [`Reply::Error`].
//!
//! A single connection may carry any number of sequential requests.

pub mod frame;
pub mod message;

pub use self::frame::{FrameError, FrameReader, FrameWriter, MAX_FRAME_BYTES};
pub use self::message::{
    DEFAULT_TAIL_LINES, NameRequest, ProgramInfo, ProgramState, ProgramStatus, Reply, Request,
    TailRequest,
};
