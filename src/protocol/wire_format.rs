//! Wire format encoding and decoding.
//!
//! Implements the 24-byte frame header:
//! ```text
//! ┌──────────┬───────────┬───────────┬───────────────┐
//! │ Kind     │ Timestamp │ Body Size │ Body Capacity │
//! │ 8 bytes  │ 8 bytes   │ 4 bytes   │ 4 bytes       │
//! │ ASCII,\0 │ uint64 BE │ uint32 BE │ uint32 BE     │
//! └──────────┴───────────┴───────────┴───────────────┘
//! ```
//!
//! The kind tag is null-padded ASCII (`"data"` or `"quit"`).
//! All multi-byte integers are Big Endian.

use crate::error::{NetopError, Result};

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 24;

/// Width of the kind tag field.
pub const KIND_SIZE: usize = 8;

/// Default body capacity (10 000 bytes).
pub const DEFAULT_BODY_CAPACITY: u32 = 10_000;

/// Largest body capacity an engine accepts (64 MiB).
pub const MAX_BODY_CAPACITY: u32 = 64 * 1024 * 1024;

const DATA_TAG: [u8; KIND_SIZE] = *b"data\0\0\0\0";
const QUIT_TAG: [u8; KIND_SIZE] = *b"quit\0\0\0\0";

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// One encoded application item.
    Data,
    /// Graceful close of the connection; never has a body.
    Quit,
}

impl FrameKind {
    /// The null-padded tag written on the wire.
    #[inline]
    pub fn tag(self) -> [u8; KIND_SIZE] {
        match self {
            FrameKind::Data => DATA_TAG,
            FrameKind::Quit => QUIT_TAG,
        }
    }

    /// Parse a wire tag.
    ///
    /// Returns `None` for anything other than `"data"` or `"quit"`.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        // Everything after the first NUL is padding.
        let end = tag.iter().position(|&b| b == 0).unwrap_or(tag.len());
        match &tag[..end] {
            b"data" => Some(FrameKind::Data),
            b"quit" => Some(FrameKind::Quit),
            _ => None,
        }
    }

    /// Tag text without padding.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Data => "data",
            FrameKind::Quit => "quit",
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind.
    pub kind: FrameKind,
    /// Producer-assigned timestamp, opaque to the transport.
    pub timestamp: u64,
    /// Number of body bytes following the header.
    pub body_size: u32,
    /// Body capacity of the writing engine.
    pub body_capacity: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: FrameKind, timestamp: u64, body_size: u32, body_capacity: u32) -> Self {
        Self {
            kind,
            timestamp,
            body_size,
            body_capacity,
        }
    }

    /// Create a data header.
    pub fn data(timestamp: u64, body_size: u32, body_capacity: u32) -> Self {
        Self::new(FrameKind::Data, timestamp, body_size, body_capacity)
    }

    /// Create a quit header (body size is always 0).
    pub fn quit(body_capacity: u32) -> Self {
        Self::new(FrameKind::Quit, 0, 0, body_capacity)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use mocap_netop::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::data(42, 100, 1024);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..4], b"data");
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (24 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..8].copy_from_slice(&self.kind.tag());
        buf[8..16].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[16..20].copy_from_slice(&self.body_size.to_be_bytes());
        buf[20..24].copy_from_slice(&self.body_capacity.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the buffer is too short or the kind tag is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use mocap_netop::protocol::{FrameKind, Header};
    ///
    /// let bytes = Header::quit(64).encode();
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.kind, FrameKind::Quit);
    /// assert_eq!(header.body_size, 0);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(NetopError::Protocol(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let kind = FrameKind::from_tag(&buf[0..8]).ok_or_else(|| {
            NetopError::Protocol(format!(
                "unknown frame kind {:?}",
                String::from_utf8_lossy(&buf[0..8])
            ))
        })?;

        Ok(Self {
            kind,
            timestamp: u64::from_be_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            body_size: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            body_capacity: u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }

    /// Validate the header against the reader's own body capacity.
    ///
    /// Checks:
    /// - Quit frames carry no body
    /// - Data frames carry a body
    /// - Body size doesn't exceed `max_body`
    pub fn validate(&self, max_body: u32) -> Result<()> {
        match self.kind {
            FrameKind::Quit if self.body_size != 0 => Err(NetopError::Protocol(format!(
                "quit frame announces a {} byte body",
                self.body_size
            ))),
            FrameKind::Data if self.body_size == 0 => Err(NetopError::Protocol(
                "data frame announces an empty body".to_string(),
            )),
            _ if self.body_size > max_body => Err(NetopError::Protocol(format!(
                "body size {} exceeds maximum {}",
                self.body_size, max_body
            ))),
            _ => Ok(()),
        }
    }

    /// Check if this is a quit signal.
    #[inline]
    pub fn is_quit(&self) -> bool {
        self.kind == FrameKind::Quit
    }

    /// Total frame length on the wire.
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.body_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::data(0xDEAD_BEEF_0102, 300, 1024);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_byte_layout() {
        let header = Header::data(0x0102_0304_0506_0708, 0x090A_0B0C, 0x0D0E_0F10);
        let bytes = header.encode();

        // Kind: null-padded ASCII
        assert_eq!(&bytes[0..8], b"data\0\0\0\0");

        // Timestamp: BE
        assert_eq!(&bytes[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);

        // Body size: BE
        assert_eq!(&bytes[16..20], &[0x09, 0x0A, 0x0B, 0x0C]);

        // Body capacity: BE
        assert_eq!(&bytes[20..24], &[0x0D, 0x0E, 0x0F, 0x10]);
    }

    #[test]
    fn test_header_size_is_exactly_24() {
        assert_eq!(HEADER_SIZE, 24);
        assert_eq!(Header::quit(0).encode().len(), 24);
    }

    #[test]
    fn test_quit_header_has_no_body() {
        let header = Header::quit(4096);
        assert!(header.is_quit());
        assert_eq!(header.body_size, 0);
        assert_eq!(header.frame_len(), HEADER_SIZE);
        assert_eq!(&header.encode()[0..8], b"quit\0\0\0\0");
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_err());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut bytes = Header::data(1, 1, 1).encode();
        bytes[0..8].copy_from_slice(b"mocap\0\0\0");

        let err = Header::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown frame kind"));
    }

    #[test]
    fn test_kind_tag_ignores_trailing_padding_garbage() {
        assert_eq!(FrameKind::from_tag(b"quit\0xyz"), Some(FrameKind::Quit));
        assert_eq!(FrameKind::from_tag(b"dat\0\0\0\0\0"), None);
        assert_eq!(FrameKind::from_tag(b"data"), Some(FrameKind::Data));
    }

    #[test]
    fn test_validate_body_too_large() {
        let header = Header::data(0, 1_000, 2_000);
        let result = header.validate(100);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_quit_with_body_rejected() {
        let header = Header::new(FrameKind::Quit, 0, 5, 64);
        assert!(header.validate(64).is_err());
    }

    #[test]
    fn test_validate_empty_data_rejected() {
        let header = Header::data(0, 0, 64);
        assert!(header.validate(64).is_err());
    }

    #[test]
    fn test_validate_accepts_limits() {
        assert!(Header::data(u64::MAX, 64, 64).validate(64).is_ok());
        assert!(Header::quit(64).validate(64).is_ok());
    }
}
