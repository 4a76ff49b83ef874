//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and body.
//! Uses `bytes::Bytes` for zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use mocap_netop::protocol::Frame;
//! use bytes::Bytes;
//!
//! let frame = Frame::data(7, Bytes::from_static(b"hello"), 64).unwrap();
//!
//! assert_eq!(frame.timestamp(), 7);
//! assert_eq!(frame.body(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{FrameKind, Header, HEADER_SIZE};
use crate::error::{NetopError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a frame from an already validated header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Create a data frame.
    ///
    /// # Errors
    ///
    /// - `CapacityViolation` if the body is larger than `body_capacity`
    /// - `EmptyBody` if the body is empty
    pub fn data(timestamp: u64, body: Bytes, body_capacity: u32) -> Result<Self> {
        check_body(body.len(), body_capacity)?;
        Ok(Self {
            header: Header::data(timestamp, body.len() as u32, body_capacity),
            body,
        })
    }

    /// Create a quit frame (no body).
    pub fn quit(body_capacity: u32) -> Self {
        Self {
            header: Header::quit(body_capacity),
            body: Bytes::new(),
        }
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Get the frame kind.
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    /// Get the producer timestamp.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Check if this is a quit signal.
    #[inline]
    pub fn is_quit(&self) -> bool {
        self.header.is_quit()
    }

    /// Serialize header and body into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_frame(&self.header, &self.body)
    }
}

/// Check an encoded body against the engine's body capacity.
pub(crate) fn check_body(size: usize, body_capacity: u32) -> Result<()> {
    if size > body_capacity as usize {
        return Err(NetopError::CapacityViolation {
            size,
            capacity: body_capacity,
        });
    }
    if size == 0 {
        return Err(NetopError::EmptyBody);
    }
    Ok(())
}

/// Build a complete frame as a single byte vector.
///
/// Encodes header and appends body into a contiguous buffer.
///
/// # Example
///
/// ```
/// use mocap_netop::protocol::{build_frame, Header, HEADER_SIZE};
///
/// let header = Header::data(1, 5, 64);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(header: &Header, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}

/// Append header and body to `dst` as one contiguous frame.
pub fn encode_frame_into(dst: &mut BytesMut, header: &Header, body: &[u8]) {
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&header.encode());
    dst.put_slice(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frame_creation() {
        let frame = Frame::data(42, Bytes::from_static(b"hello"), 64).unwrap();

        assert_eq!(frame.kind(), FrameKind::Data);
        assert_eq!(frame.timestamp(), 42);
        assert_eq!(frame.body(), b"hello");
        assert_eq!(frame.body_len(), 5);
        assert_eq!(frame.header.body_size, 5);
        assert_eq!(frame.header.body_capacity, 64);
    }

    #[test]
    fn test_data_frame_at_capacity() {
        let body = Bytes::from(vec![7u8; 64]);
        assert!(Frame::data(0, body, 64).is_ok());
    }

    #[test]
    fn test_data_frame_over_capacity() {
        let body = Bytes::from(vec![7u8; 65]);
        let err = Frame::data(0, body, 64).unwrap_err();
        assert!(matches!(
            err,
            NetopError::CapacityViolation {
                size: 65,
                capacity: 64
            }
        ));
    }

    #[test]
    fn test_data_frame_empty_body_rejected() {
        let err = Frame::data(0, Bytes::new(), 64).unwrap_err();
        assert!(matches!(err, NetopError::EmptyBody));
    }

    #[test]
    fn test_quit_frame() {
        let frame = Frame::quit(128);
        assert!(frame.is_quit());
        assert_eq!(frame.header.body_size, 0);
        assert!(frame.body().is_empty());
        assert_eq!(frame.to_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn test_build_frame() {
        let header = Header::data(9, 5, 64);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_encode_frame_into_appends() {
        let mut dst = BytesMut::from(&b"xx"[..]);
        let header = Header::data(1, 3, 8);
        encode_frame_into(&mut dst, &header, b"abc");

        assert_eq!(dst.len(), 2 + HEADER_SIZE + 3);
        assert_eq!(&dst[2..], &build_frame(&header, b"abc")[..]);
    }

    #[test]
    fn test_to_bytes_parses_back() {
        use super::super::FrameBuffer;

        let frame = Frame::data(123, Bytes::from_static(b"0123456789"), 32).unwrap();

        let mut buffer = FrameBuffer::new(32);
        let frames = buffer.push(&frame.to_bytes()).unwrap();

        assert_eq!(frames, vec![frame]);
    }
}
