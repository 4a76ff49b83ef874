//! TCP client engine.
//!
//! The [`ClientBuilder`] configures the client; [`TcpClient`] manages the
//! session lifecycle:
//! 1. Resolve and connect to `host:port`
//! 2. Spawn one send task and one receive task
//! 3. Send queued items and collect received ones through the repository
//! 4. On `disconnect`, send `"quit"` and close the socket
//!
//! The client never reconnects on its own. When the server quits or the
//! connection drops, `is_connected` turns false and a new `connect` is needed.
//!
//! # Example
//!
//! ```no_run
//! use mocap_netop::codec::RawCodec;
//! use mocap_netop::TcpClient;
//!
//! #[tokio::main]
//! async fn main() -> mocap_netop::Result<()> {
//!     let mut client = TcpClient::builder("127.0.0.1:5003")
//!         .body_capacity(1024)
//!         .build(RawCodec)?;
//!
//!     client.connect().await?;
//!
//!     let repo = client.repository();
//!     let item = repo.recv_inbound().await;
//!     println!("received {} bytes", item.len());
//!
//!     client.disconnect().await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, FrameEncoder, RawCodec};
use crate::config::{ClientConfig, ServerAddress};
use crate::error::{NetopError, Result};
use crate::protocol::{write_frame_within, FrameReader, Header};
use crate::repository::Repository;
use crate::stats::{EngineStats, StatsSnapshot};

/// Builder for a [`TcpClient`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder targeting `server_addr` (`host:port`).
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                server_addr: server_addr.into(),
                ..ClientConfig::default()
            },
        }
    }

    /// Start from a complete configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Set the body capacity.
    ///
    /// Default: 10 000 bytes
    pub fn body_capacity(mut self, capacity: u32) -> Self {
        self.config.body_capacity = capacity;
        self
    }

    /// Set the pause before retrying after a transient read error.
    ///
    /// Default: 1 ms
    pub fn stall_retry(mut self, retry: Duration) -> Self {
        self.config.stall_retry_ms = retry.as_millis() as u64;
        self
    }

    /// Set how long one frame write may take before the session is dropped.
    ///
    /// Default: 1 s
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Validate the configuration and create a disconnected client.
    pub fn build<C: Codec>(self, codec: C) -> Result<TcpClient<C>> {
        TcpClient::with_config(self.config, codec)
    }
}

struct Shared<C: Codec> {
    codec: C,
    repository: Arc<Repository<C::Outbound, C::Inbound>>,
    stats: EngineStats,
    connected: AtomicBool,
    fault: Mutex<Option<NetopError>>,
    body_capacity: u32,
    stall_retry: Duration,
    write_timeout: Duration,
}

impl<C: Codec> Shared<C> {
    fn fail(&self, error: NetopError) {
        tracing::error!("client stopped by fatal fault: {}", error);
        self.connected.store(false, Ordering::Release);
        let mut fault = self.fault.lock().unwrap_or_else(|p| p.into_inner());
        fault.get_or_insert(error);
    }

    fn take_fault(&self) -> Option<NetopError> {
        self.fault.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Handles of one connection.
struct Session {
    /// Stops both tasks.
    shutdown: CancellationToken,
    /// Set when the server ended the session; pending items are not flushed.
    peer_gone: CancellationToken,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    peer_addr: SocketAddr,
    sender: JoinHandle<()>,
    receiver: JoinHandle<()>,
}

/// Client engine: one send task and one receive task over a single connection.
pub struct TcpClient<C: Codec> {
    server_addr: ServerAddress,
    config: ClientConfig,
    shared: Arc<Shared<C>>,
    session: Option<Session>,
}

impl TcpClient<RawCodec> {
    /// Create a client builder.
    ///
    /// The codec, and with it the client type, is chosen by
    /// [`ClientBuilder::build`].
    pub fn builder(server_addr: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(server_addr)
    }
}

impl<C: Codec> TcpClient<C> {
    /// Validate `config` and create a disconnected client.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` or `InvalidConfig`; no socket is opened.
    pub fn with_config(config: ClientConfig, codec: C) -> Result<Self> {
        let server_addr = config.validate()?;

        let shared = Shared {
            codec,
            repository: Arc::new(Repository::new()),
            stats: EngineStats::new(),
            connected: AtomicBool::new(false),
            fault: Mutex::new(None),
            body_capacity: config.body_capacity,
            stall_retry: config.stall_retry(),
            write_timeout: config.write_timeout(),
        };

        Ok(Self {
            server_addr,
            config,
            shared: Arc::new(shared),
            session: None,
        })
    }

    /// Connect to the server and spawn the worker tasks.
    ///
    /// A session the server already ended is cleaned up first.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if connected
    /// - `Connect` if the server cannot be reached
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(NetopError::AlreadyRunning);
        }
        if let Some(stale) = self.session.take() {
            close_session(stale, &self.shared).await;
        }

        let stream = TcpStream::connect((self.server_addr.host.as_str(), self.server_addr.port))
            .await
            .map_err(|source| NetopError::Connect {
                addr: self.server_addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed: {}", e);
        }
        let peer_addr = stream.peer_addr()?;

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(tokio::sync::Mutex::new(write_half));
        let shutdown = CancellationToken::new();
        let peer_gone = CancellationToken::new();

        self.shared.connected.store(true, Ordering::Release);
        self.shared.stats.connection_accepted();

        let sender = tokio::spawn(send_loop(
            Arc::clone(&self.shared),
            Arc::clone(&writer),
            shutdown.clone(),
            peer_gone.clone(),
        ));
        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            read_half,
            Arc::clone(&writer),
            shutdown.clone(),
            peer_gone.clone(),
        ));

        tracing::info!("connected to {} ({})", self.server_addr, peer_addr);

        self.session = Some(Session {
            shutdown,
            peer_gone,
            writer,
            peer_addr,
            sender,
            receiver,
        });

        Ok(())
    }

    /// Close the connection.
    ///
    /// Items already queued are sent, then `"quit"` is sent best-effort, the
    /// socket is closed and the repository drained. Returns the fatal fault
    /// that ended the session, if any. Calling it again does nothing.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        self.shared.connected.store(false, Ordering::Release);
        let peer_addr = session.peer_addr;
        close_session(session, &self.shared).await;
        self.shared.repository.drain();

        tracing::info!("disconnected from {}", peer_addr);

        match self.shared.take_fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Whether the session is up.
    ///
    /// Turns false on `disconnect`, when the server quits or closes the
    /// connection, and on a fatal fault.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// The repository shared with the worker tasks.
    pub fn repository(&self) -> Arc<Repository<C::Outbound, C::Inbound>> {
        Arc::clone(&self.shared.repository)
    }

    /// Server socket address of the current session.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.peer_addr)
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<C: Codec> Drop for TcpClient<C> {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.shutdown.cancel();
        }
    }
}

impl<C: Codec> std::fmt::Debug for TcpClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("server_addr", &self.server_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Stop both tasks, then send `"quit"` and shut the socket down.
async fn close_session<C: Codec>(session: Session, shared: &Shared<C>) {
    session.shutdown.cancel();

    if let Err(e) = session.sender.await {
        tracing::error!("send task failed: {}", e);
    }
    if let Err(e) = session.receiver.await {
        tracing::error!("receive task failed: {}", e);
    }

    let mut writer = session.writer.lock().await;
    if !session.peer_gone.is_cancelled() {
        send_quit(&mut writer, shared).await;
    }
    let _ = writer.shutdown().await;
}

async fn send_quit<C: Codec>(writer: &mut OwnedWriteHalf, shared: &Shared<C>) {
    let quit = Header::quit(shared.body_capacity).encode();
    if let Err(e) = write_frame_within(writer, &quit, shared.write_timeout).await {
        tracing::debug!("quit not delivered: {}", e);
    }
}

async fn send_loop<C: Codec>(
    shared: Arc<Shared<C>>,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    shutdown: CancellationToken,
    peer_gone: CancellationToken,
) {
    let mut encoder = FrameEncoder::new(shared.body_capacity);
    // Items still to send once shutdown is signalled; later pushes are not sent.
    let mut flush: Option<usize> = None;

    loop {
        if peer_gone.is_cancelled() {
            break;
        }
        if flush.is_none() && shutdown.is_cancelled() {
            flush = Some(shared.repository.outbound_len());
        }
        if flush == Some(0) {
            break;
        }

        let Some(item) = shared.repository.pop_outbound() else {
            if shutdown.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = shared.repository.outbound_ready() => {}
            }
            continue;
        };
        if let Some(left) = flush.as_mut() {
            *left -= 1;
        }

        let frame = match encoder.encode(&shared.codec, &item) {
            Ok(frame) => frame,
            Err(e @ NetopError::CapacityViolation { .. }) => {
                shared.fail(e);
                shutdown.cancel();
                let mut guard = writer.lock().await;
                send_quit(&mut guard, &shared).await;
                let _ = guard.shutdown().await;
                peer_gone.cancel();
                break;
            }
            Err(e) => {
                tracing::warn!("dropping outbound item: {}", e);
                continue;
            }
        };

        let mut guard = writer.lock().await;
        match write_frame_within(&mut *guard, frame, shared.write_timeout).await {
            Ok(()) => shared.stats.frame_sent(),
            Err(e @ NetopError::WriteTimeout(_)) => {
                // Part of the frame may be on the wire; the stream is unusable.
                tracing::warn!("server stopped reading: {}", e);
                shared.stats.write_failure();
                shared.stats.connection_dropped();
                shared.connected.store(false, Ordering::Release);
                peer_gone.cancel();
                shutdown.cancel();
                break;
            }
            Err(e) => {
                tracing::warn!("write to server failed: {}", e);
                shared.stats.write_failure();
            }
        }
    }

    tracing::debug!("client send task stopped");
}

async fn receive_loop<C: Codec>(
    shared: Arc<Shared<C>>,
    read_half: OwnedReadHalf,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    shutdown: CancellationToken,
    peer_gone: CancellationToken,
) {
    let mut reader = FrameReader::new(read_half, shared.body_capacity);

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = reader.read_frame() => result,
        };

        match result {
            Ok(frame) if frame.is_quit() => {
                tracing::info!("server sent quit");
                break;
            }
            Ok(frame) => match shared.codec.decode(frame.timestamp(), frame.body()) {
                Ok(item) => {
                    shared.repository.push_inbound(item);
                    shared.stats.frame_received();
                }
                Err(e) => {
                    tracing::warn!("dropping frame from server: {}", e);
                    shared.stats.malformed_payload();
                }
            },
            Err(e) if e.is_transient() => {
                tokio::time::sleep(shared.stall_retry).await;
            }
            Err(e) if e.is_disconnect() => {
                tracing::info!("server closed the connection: {}", e);
                break;
            }
            Err(e) => {
                tracing::warn!("closing connection: {}", e);
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
    shared.stats.connection_dropped();
    peer_gone.cancel();
    shutdown.cancel();

    let _ = writer.lock().await.shutdown().await;
}
