//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 24 bytes
//! - `WaitingForBody`: Header parsed, need N more body bytes
//!
//! A quit header completes a frame immediately; its body is never read.
//!
//! # Example
//!
//! ```
//! use mocap_netop::protocol::{Frame, FrameBuffer};
//! use bytes::Bytes;
//!
//! let bytes = Frame::data(1, Bytes::from_static(b"pose"), 64).unwrap().to_bytes();
//!
//! let mut buffer = FrameBuffer::new(64);
//! assert!(buffer.push(&bytes[..10]).unwrap().is_empty());
//!
//! let frames = buffer.push(&bytes[10..]).unwrap();
//! assert_eq!(frames[0].body(), b"pose");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 24 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` buffer sized once for
/// `HEADER_SIZE + max_body`.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_body: u32,
}

impl FrameBuffer {
    /// Create a frame buffer accepting bodies up to `max_body` bytes.
    pub fn new(max_body: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(HEADER_SIZE + max_body as usize),
            state: State::WaitingForHeader,
            max_body,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// If data is fragmented, partial data is buffered internally for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if a header is malformed or announces a body larger
    /// than `max_body`. The stream cannot be resynchronized after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append bytes without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on protocol violation
    pub fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = Header::decode(&self.buffer[..HEADER_SIZE])?;
                    header.validate(self.max_body)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.is_quit() {
                        return Ok(Some(Frame::new(header, Bytes::new())));
                    }

                    self.state = State::WaitingForBody { header };
                }

                State::WaitingForBody { header } => {
                    let needed = header.body_size as usize;
                    if self.buffer.len() < needed {
                        return Ok(None);
                    }

                    let header = *header;
                    let body = self.buffer.split_to(needed).freeze();
                    self.state = State::WaitingForHeader;

                    return Ok(Some(Frame::new(header, body)));
                }
            }
        }
    }

    /// Bytes still missing to complete the frame currently being parsed.
    pub fn missing(&self) -> usize {
        match &self.state {
            State::WaitingForHeader => HEADER_SIZE.saturating_sub(self.buffer.len()),
            State::WaitingForBody { header } => {
                (header.body_size as usize).saturating_sub(self.buffer.len())
            }
        }
    }

    /// Bytes expected in total for the frame part currently being parsed.
    pub fn expected(&self) -> usize {
        match &self.state {
            State::WaitingForHeader => HEADER_SIZE,
            State::WaitingForBody { header } => header.body_size as usize,
        }
    }

    /// Maximum body size this buffer accepts.
    pub fn max_body(&self) -> u32 {
        self.max_body
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame has been partially received.
    pub fn is_mid_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForBody { .. })
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameKind};

    fn make_frame_bytes(timestamp: u64, body: &[u8]) -> Vec<u8> {
        build_frame(&Header::data(timestamp, body.len() as u32, 1024), body)
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new(1024);
        let frames = buffer.push(&make_frame_bytes(42, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp(), 42);
        assert_eq!(frames[0].body(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new(1024);

        let mut combined = make_frame_bytes(1, b"first");
        combined.extend_from_slice(&make_frame_bytes(2, b"second"));
        combined.extend_from_slice(&make_frame_bytes(3, b"third"));

        let frames = buffer.push(&combined).unwrap();

        let stamps: Vec<u64> = frames.iter().map(Frame::timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new(1024);
        let bytes = make_frame_bytes(42, b"test");

        assert!(buffer.push(&bytes[..5]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert_eq!(buffer.missing(), HEADER_SIZE - 5);

        let frames = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = FrameBuffer::new(1024);
        let body = b"this is a longer body that will be fragmented";
        let bytes = make_frame_bytes(42, body);

        let partial = HEADER_SIZE + 10;
        assert!(buffer.push(&bytes[..partial]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert_eq!(buffer.missing(), body.len() - 10);
        assert_eq!(buffer.expected(), body.len());

        let frames = buffer.push(&bytes[partial..]).unwrap();
        assert_eq!(frames[0].body(), body);
    }

    #[test]
    fn test_quit_completes_without_body() {
        let mut buffer = FrameBuffer::new(1024);
        let mut bytes = Header::quit(1024).encode().to_vec();
        bytes.extend_from_slice(&make_frame_bytes(5, b"after"));

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), FrameKind::Quit);
        assert!(frames[0].body().is_empty());
        assert_eq!(frames[1].body(), b"after");
    }

    #[test]
    fn test_max_body_validation() {
        let mut buffer = FrameBuffer::new(100);
        let header = Header::data(0, 1000, 1000);

        let result = buffer.push(&header.encode());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut buffer = FrameBuffer::new(100);
        let mut bytes = Header::data(0, 1, 100).encode();
        bytes[0] = b'x';

        assert!(buffer.push(&bytes).is_err());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new(1024);
        let bytes = make_frame_bytes(42, b"test");

        buffer.push(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert!(buffer.is_mid_frame());

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(!buffer.is_mid_frame());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new(1024);
        let bytes = make_frame_bytes(42, b"hi");

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].body(), b"hi");
    }
}
