//! Engine configuration.
//!
//! Both engines can be configured through their builders or from JSON:
//!
//! ```
//! use mocap_netop::config::{OverflowPolicy, ServerConfig};
//!
//! let config = ServerConfig::from_json(r#"{
//!     "bind_addr": "127.0.0.1:5003",
//!     "max_connections": 2,
//!     "overflow": "queue"
//! }"#).unwrap();
//!
//! assert_eq!(config.max_connections, 2);
//! assert_eq!(config.overflow, OverflowPolicy::Queue);
//! assert_eq!(config.body_capacity, mocap_netop::protocol::DEFAULT_BODY_CAPACITY);
//! ```
//!
//! Values are checked by `validate`, which every engine constructor calls
//! before any socket is opened.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NetopError, Result};
use crate::protocol::{DEFAULT_BODY_CAPACITY, MAX_BODY_CAPACITY};

/// Default number of server connection slots.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Default pause before retrying after a transient read error.
pub const DEFAULT_STALL_RETRY_MS: u64 = 1;

/// Default bound on writing one frame to one peer.
///
/// A peer that cannot take a whole frame within this time is treated as gone.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1_000;

/// Default server bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5003";

/// Default client target address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:5003";

/// What the server does with a connection that arrives while every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Accept it, send `"quit"` and close it immediately.
    #[default]
    Reject,
    /// Leave it in the listen backlog until a slot frees up.
    Queue,
}

/// Server engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, an `ip:port` literal.
    pub bind_addr: String,
    /// Number of connection slots.
    pub max_connections: usize,
    /// Largest encoded body the engine sends or accepts.
    pub body_capacity: u32,
    /// Handling of connections beyond `max_connections`.
    pub overflow: OverflowPolicy,
    /// Pause before retrying after a transient read error, in milliseconds.
    pub stall_retry_ms: u64,
    /// Longest a single frame write may take, in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            body_capacity: DEFAULT_BODY_CAPACITY,
            overflow: OverflowPolicy::default(),
            stall_retry_ms: DEFAULT_STALL_RETRY_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check every field and return the parsed bind address.
    pub fn validate(&self) -> Result<SocketAddr> {
        let addr = parse_bind_addr(&self.bind_addr)?;
        if self.max_connections == 0 {
            return Err(NetopError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }
        validate_body_capacity(self.body_capacity)?;
        validate_write_timeout(self.write_timeout_ms)?;
        Ok(addr)
    }

    /// Transient read error back-off.
    pub fn stall_retry(&self) -> Duration {
        Duration::from_millis(self.stall_retry_ms)
    }

    /// Bound on one frame write.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Client engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub server_addr: String,
    /// Largest encoded body the engine sends or accepts.
    pub body_capacity: u32,
    /// Pause before retrying after a transient read error, in milliseconds.
    pub stall_retry_ms: u64,
    /// Longest a single frame write may take, in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            body_capacity: DEFAULT_BODY_CAPACITY,
            stall_retry_ms: DEFAULT_STALL_RETRY_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check every field and return the parsed server address.
    pub fn validate(&self) -> Result<ServerAddress> {
        let addr = self.server_addr.parse::<ServerAddress>()?;
        validate_body_capacity(self.body_capacity)?;
        validate_write_timeout(self.write_timeout_ms)?;
        Ok(addr)
    }

    /// Transient read error back-off.
    pub fn stall_retry(&self) -> Duration {
        Duration::from_millis(self.stall_retry_ms)
    }

    /// Bound on one frame write.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// A `host:port` pair. The host may be a name or an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// Host name or IP address, without IPv6 brackets.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl std::str::FromStr for ServerAddress {
    type Err = NetopError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || NetopError::InvalidAddress(format!("{s:?} is not host:port"));

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_bind_addr(text: &str) -> Result<SocketAddr> {
    text.parse::<SocketAddr>()
        .map_err(|_| NetopError::InvalidAddress(format!("{text:?} is not an ip:port literal")))
}

fn validate_body_capacity(capacity: u32) -> Result<()> {
    if capacity == 0 || capacity > MAX_BODY_CAPACITY {
        return Err(NetopError::InvalidConfig(format!(
            "body_capacity must be in 1..={MAX_BODY_CAPACITY}, got {capacity}"
        )));
    }
    Ok(())
}

fn validate_write_timeout(timeout_ms: u64) -> Result<()> {
    if timeout_ms == 0 {
        return Err(NetopError::InvalidConfig(
            "write_timeout_ms must be at least 1".to_string(),
        ));
    }
    Ok(())
}
