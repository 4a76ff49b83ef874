//! Async frame I/O over a byte stream.
//!
//! `FrameReader` pulls bytes from any `AsyncRead` into a [`FrameBuffer`] and
//! hands out one frame at a time. `write_frame` performs the single reliable
//! write of an already encoded frame; `write_frame_within` bounds it in time.
//!
//! ```text
//! socket ─► read() ─► FrameBuffer ─► Frame
//! Frame bytes ─► write_all() + flush() ─► socket
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Frame, FrameBuffer, HEADER_SIZE};
use crate::error::{NetopError, Result};

/// Reads complete frames from an async byte stream.
///
/// `read_frame` is cancel safe: bytes received before a cancelled call stay
/// buffered for the next one.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a reader accepting bodies up to `body_capacity` bytes.
    pub fn new(reader: R, body_capacity: u32) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(body_capacity),
            chunk: vec![0u8; HEADER_SIZE + body_capacity as usize],
        }
    }

    /// Read the next frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the peer closed on a frame boundary
    /// - `ShortRead` if the peer closed in the middle of a frame
    /// - `Protocol` if a header is malformed or too large for this reader
    /// - `Io` for any other read failure
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.buffer.try_extract_one()? {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.buffer.is_mid_frame() {
                    return Err(NetopError::ShortRead {
                        expected: self.buffer.expected(),
                        received: self.buffer.len(),
                    });
                }
                return Err(NetopError::ConnectionClosed);
            }

            self.buffer.extend(&self.chunk[..n]);
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the frame reader, returning the underlying reader.
    ///
    /// Bytes buffered but not yet returned as a frame are discarded.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Write one encoded frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Write one encoded frame, giving up after `limit`.
///
/// On `WriteTimeout` part of the frame may already be on the wire, so the
/// stream is no longer usable.
pub async fn write_frame_within<W>(writer: &mut W, frame: &[u8], limit: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(limit, write_frame(writer, frame))
        .await
        .map_err(|_| NetopError::WriteTimeout(limit))?
}
