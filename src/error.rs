//! Error types for mocap-netop.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Main error type for all transport operations.
#[derive(Debug, Error)]
pub enum NetopError {
    /// The server could not bind or listen on its address (address in use, permission, ...).
    ///
    /// Fatal to `start`, but the caller may retry with backoff.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The client could not open a connection to the server.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address text the client tried to reach.
        addr: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed `host:port` address text.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Engine parameters out of range (zero capacity, zero connections, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error on a single connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream in the middle of a frame.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead {
        /// Bytes needed to complete the frame part being read.
        expected: usize,
        /// Bytes actually received before the peer closed.
        received: usize,
    },

    /// A frame write did not complete in time; the peer stopped reading.
    #[error("frame write did not complete within {0:?}")]
    WriteTimeout(Duration),

    /// The peer closed the stream on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// Frame header violates the wire protocol (unknown kind, oversized body, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The codec could not decode a frame body into an item.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The codec produced a body larger than the engine's body capacity.
    #[error("encoded body of {size} bytes exceeds body capacity {capacity}")]
    CapacityViolation {
        /// Size of the encoded body.
        size: usize,
        /// Negotiated body capacity of the engine.
        capacity: u32,
    },

    /// The codec produced an empty body for a data frame.
    #[error("data frame body is empty")]
    EmptyBody,

    /// `start`/`connect` called on an engine that is already running.
    #[error("engine is already running")]
    AlreadyRunning,

    /// Operation requires a running engine.
    #[error("engine is not running")]
    NotRunning,

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// JSON configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl NetopError {
    /// Whether this error means the peer is gone and the connection should be released.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            NetopError::ConnectionClosed
                | NetopError::ShortRead { .. }
                | NetopError::WriteTimeout(_)
        ) || matches!(self, NetopError::Io(e) if is_disconnect_kind(e.kind()))
    }

    /// Whether a failed read may succeed if retried on the same connection.
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;

        matches!(
            self,
            NetopError::Io(e) if matches!(
                e.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            )
        )
    }
}

fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;

    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

/// Result type alias using NetopError.
pub type Result<T> = std::result::Result<T, NetopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        assert!(NetopError::ConnectionClosed.is_disconnect());
        assert!(NetopError::ShortRead {
            expected: 24,
            received: 3
        }
        .is_disconnect());
        assert!(NetopError::Io(std::io::ErrorKind::ConnectionReset.into()).is_disconnect());
        assert!(NetopError::WriteTimeout(Duration::from_millis(5)).is_disconnect());

        assert!(!NetopError::Io(std::io::ErrorKind::Interrupted.into()).is_disconnect());
        assert!(!NetopError::MalformedPayload("x".into()).is_disconnect());
    }

    #[test]
    fn test_transient_classification() {
        assert!(NetopError::Io(std::io::ErrorKind::Interrupted.into()).is_transient());
        assert!(NetopError::Io(std::io::ErrorKind::WouldBlock.into()).is_transient());
        assert!(!NetopError::Io(std::io::ErrorKind::BrokenPipe.into()).is_transient());
        assert!(!NetopError::ConnectionClosed.is_transient());
    }

    #[test]
    fn test_capacity_violation_message() {
        let err = NetopError::CapacityViolation {
            size: 100,
            capacity: 64,
        };
        assert_eq!(
            err.to_string(),
            "encoded body of 100 bytes exceeds body capacity 64"
        );
    }
}
