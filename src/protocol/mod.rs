//! Protocol module - wire format, framing, and frame I/O.
//!
//! This module implements the binary protocol shared by server and client:
//! - 24-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - Async frame reader and writer

mod frame;
mod frame_buffer;
mod io;
mod wire_format;

pub(crate) use frame::check_body;
pub use frame::{build_frame, encode_frame_into, Frame};
pub use frame_buffer::FrameBuffer;
pub use io::{write_frame, write_frame_within, FrameReader};
pub use wire_format::{
    FrameKind, Header, DEFAULT_BODY_CAPACITY, HEADER_SIZE, KIND_SIZE, MAX_BODY_CAPACITY,
};
