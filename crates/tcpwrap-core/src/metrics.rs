//! Endpoint metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of an endpoint's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    /// Total number of bytes written.
    pub bytes_sent: u64,

    /// Total number of bytes read.
    pub bytes_received: u64,

    /// Connections established by the background task.
    pub connections: u64,

    /// Failed accept, connect, or connection setup attempts.
    pub failed_connections: u64,

    /// Connections closed by the peer.
    pub resets: u64,
}

/// Lock-free counters updated from the caller and the background task.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total bytes written (atomic counter).
    pub bytes_sent: AtomicU64,

    /// Total bytes read (atomic counter).
    pub bytes_received: AtomicU64,

    /// Established connections (atomic counter).
    pub connections: AtomicU64,

    /// Failed attempts (atomic counter).
    pub failed_connections: AtomicU64,

    /// Peer resets (atomic counter).
    pub resets: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to the sent byte counter.
    pub fn record_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Adds `n` to the received byte counter.
    pub fn record_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of all counters.
    pub fn snapshot(&self) -> EndpointMetrics {
        EndpointMetrics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}
