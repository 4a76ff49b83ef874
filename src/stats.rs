//! Engine counters.
//!
//! Counters are plain atomics updated by the worker tasks with relaxed
//! ordering; `snapshot` gives a serializable copy for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters of one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    malformed_payloads: AtomicU64,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    connections_dropped: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Data frames written (one per peer for a broadcast).
    pub frames_sent: u64,
    /// Data frames read and decoded.
    pub frames_received: u64,
    /// Data frames dropped because the codec could not decode them.
    pub malformed_payloads: u64,
    /// Connections that got a slot (server) or were established (client).
    pub connections_accepted: u64,
    /// Connections closed because every slot was taken.
    pub connections_rejected: u64,
    /// Connections released after a quit, read failure or failed probe.
    pub connections_dropped: u64,
    /// Frame writes that failed.
    pub write_failures: u64,
}

impl EngineStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_dropped: self.connections_dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed_payload(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_dropped(&self) {
        self.connections_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }
}
