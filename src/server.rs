//! TCP server engine.
//!
//! One server broadcasts every outbound item to all connected clients and
//! collects inbound items from each of them:
//!
//! ```text
//!                     ┌──────────────┐
//!  push_outbound ───► │  send task   │ ──► frame ──► slot 0 … slot N-1
//!                     └──────────────┘
//!                     ┌──────────────┐
//!  TcpListener ─────► │ accept task  │ ──► try_occupy ──► handoff to slot task
//!                     └──────────────┘
//!                     ┌──────────────┐
//!  slot k socket ───► │ receive task │ ──► decode ──► push_inbound
//!                     └──────────────┘     (one per slot, idle while empty)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use mocap_netop::codec::RawCodec;
//! use mocap_netop::TcpServer;
//!
//! #[tokio::main]
//! async fn main() -> mocap_netop::Result<()> {
//!     let mut server = TcpServer::builder("0.0.0.0:5003")
//!         .max_connections(4)
//!         .body_capacity(1024)
//!         .build(RawCodec)?;
//!
//!     server.start().await?;
//!     server.repository().push_outbound(Bytes::from_static(b"frame"));
//!
//!     // ...
//!
//!     server.stop().await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, FrameEncoder, RawCodec};
use crate::config::{OverflowPolicy, ServerConfig};
use crate::connection::Peer;
use crate::error::{NetopError, Result};
use crate::protocol::FrameReader;
use crate::registry::{ConnectionRegistry, SlotToken};
use crate::repository::Repository;
use crate::stats::{EngineStats, StatsSnapshot};

/// A connection handed from the accept task to the receive task of its slot.
type Handoff = (SlotToken, Arc<Peer>, OwnedReadHalf);

/// Builder for a [`TcpServer`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder listening on `bind_addr` (`ip:port`).
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            config: ServerConfig {
                bind_addr: bind_addr.into(),
                ..ServerConfig::default()
            },
        }
    }

    /// Start from a complete configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Set the number of connection slots.
    ///
    /// Default: 5
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set the body capacity.
    ///
    /// Default: 10 000 bytes
    pub fn body_capacity(mut self, capacity: u32) -> Self {
        self.config.body_capacity = capacity;
        self
    }

    /// Set what happens to connections beyond `max_connections`.
    ///
    /// Default: [`OverflowPolicy::Reject`]
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    /// Set the pause before retrying after a transient read or accept error.
    ///
    /// Default: 1 ms
    pub fn stall_retry(mut self, retry: Duration) -> Self {
        self.config.stall_retry_ms = retry.as_millis() as u64;
        self
    }

    /// Set how long one frame write to one client may take.
    ///
    /// A client that does not take a frame in time is disconnected.
    ///
    /// Default: 1 s
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Validate the configuration and create a stopped server.
    pub fn build<C: Codec>(self, codec: C) -> Result<TcpServer<C>> {
        TcpServer::with_config(self.config, codec)
    }
}

/// State shared by the server handle and its tasks.
struct Shared<C: Codec> {
    codec: C,
    repository: Arc<Repository<C::Outbound, C::Inbound>>,
    registry: ConnectionRegistry<Arc<Peer>>,
    stats: EngineStats,
    running: AtomicBool,
    fault: Mutex<Option<NetopError>>,
    body_capacity: u32,
    overflow: OverflowPolicy,
    stall_retry: Duration,
    write_timeout: Duration,
}

impl<C: Codec> Shared<C> {
    /// Record a fatal fault and take the engine out of the running state.
    fn fail(&self, error: NetopError) {
        tracing::error!("server stopped by fatal fault: {}", error);
        self.running.store(false, Ordering::Release);
        let mut fault = self.fault.lock().unwrap_or_else(|p| p.into_inner());
        fault.get_or_insert(error);
    }

    fn take_fault(&self) -> Option<NetopError> {
        self.fault.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Free the slot of `token` and let go of its peer.
    fn release(&self, token: SlotToken, peer: &Peer) {
        if self.registry.free(token).is_some() {
            self.stats.connection_dropped();
            tracing::debug!("released {} ({})", token, peer.addr());
        }
        peer.close();
    }

    /// Send `"quit"` to every client and release its slot.
    async fn dismiss_all(&self) {
        for (token, peer) in self.registry.snapshot() {
            peer.quit().await;
            self.release(token, &peer);
        }
    }
}

/// Handles of one running session.
struct Running {
    shutdown: CancellationToken,
    local_addr: SocketAddr,
    accept: JoinHandle<()>,
    sender: JoinHandle<()>,
    receivers: Vec<JoinHandle<()>>,
}

/// Server engine: accept task, broadcast-send task and one receive task per slot.
pub struct TcpServer<C: Codec> {
    bind_addr: SocketAddr,
    config: ServerConfig,
    shared: Arc<Shared<C>>,
    running: Option<Running>,
}

impl TcpServer<RawCodec> {
    /// Create a server builder.
    ///
    /// The codec, and with it the server type, is chosen by
    /// [`ServerBuilder::build`].
    pub fn builder(bind_addr: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(bind_addr)
    }
}

impl<C: Codec> TcpServer<C> {
    /// Validate `config` and create a stopped server.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` or `InvalidConfig`; nothing is bound yet.
    pub fn with_config(config: ServerConfig, codec: C) -> Result<Self> {
        let bind_addr = config.validate()?;

        let shared = Shared {
            codec,
            repository: Arc::new(Repository::new()),
            registry: ConnectionRegistry::new(config.max_connections),
            stats: EngineStats::new(),
            running: AtomicBool::new(false),
            fault: Mutex::new(None),
            body_capacity: config.body_capacity,
            overflow: config.overflow,
            stall_retry: config.stall_retry(),
            write_timeout: config.write_timeout(),
        };

        Ok(Self {
            bind_addr,
            config,
            shared: Arc::new(shared),
            running: None,
        })
    }

    /// Bind the listening socket and spawn the worker tasks.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a session exists; call `stop` first
    /// - `Bind` if the address cannot be bound (the caller may retry)
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(NetopError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|source| NetopError::Bind {
                addr: self.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        self.shared.take_fault();
        self.shared.running.store(true, Ordering::Release);

        let shutdown = CancellationToken::new();

        let mut handoffs = Vec::with_capacity(self.config.max_connections);
        let mut receivers = Vec::with_capacity(self.config.max_connections);
        for _ in 0..self.config.max_connections {
            let (tx, rx) = mpsc::unbounded_channel();
            handoffs.push(tx);
            receivers.push(tokio::spawn(receive_loop(
                Arc::clone(&self.shared),
                rx,
                shutdown.clone(),
            )));
        }

        let accept = tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            handoffs,
            shutdown.clone(),
        ));
        let sender = tokio::spawn(send_loop(Arc::clone(&self.shared), shutdown.clone()));

        tracing::info!(
            "server listening on {} ({} slots, body capacity {})",
            local_addr,
            self.config.max_connections,
            self.config.body_capacity
        );

        self.running = Some(Running {
            shutdown,
            local_addr,
            accept,
            sender,
            receivers,
        });

        Ok(())
    }

    /// Shut the server down.
    ///
    /// Items already queued are sent, every connected client gets `"quit"`,
    /// all tasks are joined, the registry is cleared and the repository
    /// drained. Returns the fatal fault that stopped the engine, if any.
    /// Calling `stop` on a stopped server does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        self.shared.running.store(false, Ordering::Release);
        running.shutdown.cancel();

        join("accept", running.accept).await;
        join("send", running.sender).await;

        self.shared.dismiss_all().await;

        for receiver in running.receivers {
            join("receive", receiver).await;
        }

        self.shared.registry.clear();
        self.shared.repository.drain();

        tracing::info!("server on {} stopped", running.local_addr);

        match self.shared.take_fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Whether the server is accepting and sending.
    ///
    /// Turns false on `stop` and on a fatal fault.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// The repository shared with the worker tasks.
    pub fn repository(&self) -> Arc<Repository<C::Outbound, C::Inbound>> {
        Arc::clone(&self.shared.repository)
    }

    /// Address actually bound, while a session exists.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Number of occupied connection slots.
    pub fn connection_count(&self) -> usize {
        self.shared.registry.occupied_count()
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// The configuration this server was built from.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<C: Codec> Drop for TcpServer<C> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}

impl<C: Codec> std::fmt::Debug for TcpServer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("bind_addr", &self.bind_addr)
            .field("running", &self.is_running())
            .field("connections", &self.connection_count())
            .finish()
    }
}

async fn join(task: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        tracing::error!("{} task failed: {}", task, e);
    }
}

async fn accept_loop<C: Codec>(
    shared: Arc<Shared<C>>,
    listener: TcpListener,
    handoffs: Vec<mpsc::UnboundedSender<Handoff>>,
    shutdown: CancellationToken,
) {
    loop {
        if shared.overflow == OverflowPolicy::Queue {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = shared.registry.vacancy() => {}
            }
        }

        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    tokio::time::sleep(shared.stall_retry).await;
                    continue;
                }
            },
        };

        admit(&shared, stream, addr, &handoffs).await;
    }

    tracing::debug!("accept task stopped");
}

async fn admit<C: Codec>(
    shared: &Shared<C>,
    stream: TcpStream,
    addr: SocketAddr,
    handoffs: &[mpsc::UnboundedSender<Handoff>],
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay on {} failed: {}", addr, e);
    }

    let (read_half, write_half) = stream.into_split();
    let peer = Arc::new(Peer::new(
        addr,
        write_half,
        shared.body_capacity,
        shared.write_timeout,
    ));

    match shared.registry.try_occupy(Arc::clone(&peer)) {
        Ok(token) => {
            shared.stats.connection_accepted();
            tracing::info!("client {} connected on {}", addr, token);
            if handoffs[token.index()].send((token, peer, read_half)).is_err() {
                shared.registry.free(token);
            }
        }
        Err(peer) => {
            shared.stats.connection_rejected();
            tracing::warn!(
                "rejecting {}: all {} slots taken",
                addr,
                shared.registry.capacity()
            );
            peer.quit().await;
        }
    }
}

async fn send_loop<C: Codec>(shared: Arc<Shared<C>>, shutdown: CancellationToken) {
    let mut encoder = FrameEncoder::new(shared.body_capacity);
    // Items still to send once shutdown is signalled; later pushes are not sent.
    let mut flush: Option<usize> = None;

    loop {
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
                shared.dismiss_all().await;
                break;
            }
            Err(e) => {
                tracing::warn!("dropping outbound item: {}", e);
                continue;
            }
        };

        broadcast(&shared, frame).await;
    }

    tracing::debug!("send task stopped");
}

/// Write one frame to every occupied slot in turn.
async fn broadcast<C: Codec>(shared: &Shared<C>, frame: &[u8]) {
    for (token, peer) in shared.registry.snapshot() {
        if !peer.is_alive().await {
            tracing::debug!("{} ({}) is gone", token, peer.addr());
            shared.release(token, &peer);
            continue;
        }

        match peer.send(frame).await {
            Ok(()) => shared.stats.frame_sent(),
            Err(e) => {
                tracing::warn!("write to {} failed: {}", peer.addr(), e);
                shared.stats.write_failure();
                shared.release(token, &peer);
            }
        }
    }
}

async fn receive_loop<C: Codec>(
    shared: Arc<Shared<C>>,
    mut handoffs: mpsc::UnboundedReceiver<Handoff>,
    shutdown: CancellationToken,
) {
    loop {
        let (token, peer, read_half) = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = handoffs.recv() => match next {
                Some(handoff) => handoff,
                None => break,
            },
        };

        serve(&shared, token, &peer, read_half, &shutdown).await;
    }
}

/// Read frames from one occupant until it quits, fails or is closed.
async fn serve<C: Codec>(
    shared: &Shared<C>,
    token: SlotToken,
    peer: &Peer,
    read_half: OwnedReadHalf,
    shutdown: &CancellationToken,
) {
    let mut reader = FrameReader::new(read_half, shared.body_capacity);

    loop {
        let result = tokio::select! {
            // stop() performs the quit handshake and clears the registry.
            _ = shutdown.cancelled() => return,
            _ = peer.closed() => break,
            result = reader.read_frame() => result,
        };

        match result {
            Ok(frame) if frame.is_quit() => {
                tracing::info!("client {} quit", peer.addr());
                break;
            }
            Ok(frame) => match shared.codec.decode(frame.timestamp(), frame.body()) {
                Ok(item) => {
                    shared.repository.push_inbound(item);
                    shared.stats.frame_received();
                }
                Err(e) => {
                    tracing::warn!("dropping frame from {}: {}", peer.addr(), e);
                    shared.stats.malformed_payload();
                }
            },
            Err(e) if e.is_transient() => {
                tokio::time::sleep(shared.stall_retry).await;
            }
            Err(e) if e.is_disconnect() => {
                tracing::info!("client {} disconnected: {}", peer.addr(), e);
                break;
            }
            Err(e) => {
                tracing::warn!("closing {}: {}", peer.addr(), e);
                break;
            }
        }
    }

    shared.release(token, peer);
}
