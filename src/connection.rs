//! Server-side handle for one accepted connection.
//!
//! The read half of the socket goes to the slot's receive task; the write
//! half stays here behind an async mutex so the broadcast task and the stop
//! handshake never interleave partial frames.

use std::fmt;
use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::SockRef;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::protocol::{write_frame_within, Header};

/// One connected peer.
pub(crate) struct Peer {
    addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    closed: CancellationToken,
    body_capacity: u32,
    write_timeout: Duration,
}

impl Peer {
    pub(crate) fn new(
        addr: SocketAddr,
        writer: OwnedWriteHalf,
        body_capacity: u32,
        write_timeout: Duration,
    ) -> Self {
        Self {
            addr,
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
            body_capacity,
            write_timeout,
        }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write one complete frame.
    ///
    /// A peer that does not take the whole frame within the write timeout
    /// fails with `WriteTimeout` and must be released.
    pub(crate) async fn send(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame_within(&mut *writer, frame, self.write_timeout).await
    }

    /// Non-consuming probe for a half-closed peer.
    ///
    /// Peeks one byte without blocking: end of stream means the peer is
    /// gone; pending data or nothing to read yet means it is still there.
    pub(crate) async fn is_alive(&self) -> bool {
        let writer = self.writer.lock().await;
        let stream: &TcpStream = (*writer).as_ref();
        probe(stream)
    }

    /// Send `"quit"` and shut down the write side. Failures are ignored.
    pub(crate) async fn quit(&self) {
        let mut writer = self.writer.lock().await;
        let quit = Header::quit(self.body_capacity).encode();
        if let Err(e) = write_frame_within(&mut *writer, &quit, self.write_timeout).await {
            tracing::debug!("quit to {} not delivered: {}", self.addr, e);
        }
        let _ = writer.shutdown().await;
    }

    /// Tell the receive task serving this peer to let go of it.
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once `close` has been called.
    pub(crate) async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.addr)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

fn probe(stream: &TcpStream) -> bool {
    let socket = SockRef::from(stream);
    let mut buf = [MaybeUninit::<u8>::uninit(); 1];
    match socket.peek(&mut buf) {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) if e.kind() == ErrorKind::WouldBlock => true,
        Err(e) if e.kind() == ErrorKind::Interrupted => true,
        Err(_) => false,
    }
}
