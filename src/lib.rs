//! # mocap-netop
//!
//! Framed TCP transport for streaming time-series records (motion-capture
//! frames, recognition results) between one producer and many consumers.
//!
//! ## Architecture
//!
//! - **Frame protocol**: 24-byte header (`"data"`/`"quit"` kind, timestamp,
//!   body size, body capacity) followed by the body
//! - **Repository**: outbound and inbound queues between the application and
//!   the network tasks
//! - **Server**: accepts up to `max_connections` clients, broadcasts every
//!   outbound item to all of them and collects their items
//! - **Client**: one connection, one send task, one receive task
//! - **Codec**: turns items into frame bodies and back
//!
//! ## Example
//!
//! ```no_run
//! use mocap_netop::mocap::{MocapClientCodec, MocapFrame, MocapServerCodec};
//! use mocap_netop::{TcpClient, TcpServer};
//!
//! #[tokio::main]
//! async fn main() -> mocap_netop::Result<()> {
//!     let mut server = TcpServer::builder("127.0.0.1:5003").build(MocapServerCodec)?;
//!     server.start().await?;
//!
//!     let mut client = TcpClient::builder("127.0.0.1:5003").build(MocapClientCodec::new())?;
//!     client.connect().await?;
//!
//!     server.repository().push_outbound(MocapFrame::default());
//!     let frame = client.repository().recv_inbound().await;
//!     println!("frame {} with {} poses", frame.timestamp, frame.poses.len());
//!
//!     client.disconnect().await?;
//!     server.stop().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod mocap;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod stats;

mod client;
mod connection;
mod server;

pub use client::{ClientBuilder, TcpClient};
pub use config::{ClientConfig, OverflowPolicy, ServerConfig};
pub use error::{NetopError, Result};
pub use registry::{ConnectionRegistry, SlotToken};
pub use repository::Repository;
pub use server::{ServerBuilder, TcpServer};
pub use stats::{EngineStats, StatsSnapshot};
