//! Observability counters for a running server.
//!
//! One `Metrics` instance belongs to each server and is shared by `Arc`
//! between the accept loop, the coordination loop and the peer tasks.
//! Uses atomic counters so no task ever blocks on bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Inbound connections accepted by the listener
    pub connections_accepted: AtomicU64,
    /// Outbound connections dialed through `connect`
    pub connections_dialed: AtomicU64,
    /// Peers currently in the registry
    pub peers_active: AtomicU64,
    /// Peers removed from the registry
    pub peers_removed: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Failed handshakes
    pub handshakes_failed: AtomicU64,
    /// Payloads received from registered peers
    pub messages_received: AtomicU64,
    /// Payload bytes received from registered peers
    pub bytes_received: AtomicU64,
    /// Payloads sent
    pub messages_sent: AtomicU64,
    /// Payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Handler invocations that returned an error
    pub handler_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            connections_dialed: AtomicU64::new(0),
            peers_active: AtomicU64::new(0),
            peers_removed: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_dialed(&self) {
        self.connections_dialed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a peer entering the registry
    pub fn peer_registered(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
        self.peers_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a peer leaving the registry
    pub fn peer_removed(&self) {
        self.peers_active.fetch_sub(1, Ordering::Relaxed);
        self.peers_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_dialed: self.connections_dialed.load(Ordering::Relaxed),
            peers_active: self.peers_active.load(Ordering::Relaxed),
            peers_removed: self.peers_removed.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_accepted = snapshot.connections_accepted,
            connections_dialed = snapshot.connections_dialed,
            peers_active = snapshot.peers_active,
            peers_removed = snapshot.peers_removed,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            messages_received = snapshot.messages_received,
            bytes_received = snapshot.bytes_received,
            messages_sent = snapshot.messages_sent,
            bytes_sent = snapshot.bytes_sent,
            handler_errors = snapshot.handler_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_dialed: u64,
    pub peers_active: u64,
    pub peers_removed: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub handler_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_gauge_tracks_add_and_remove() {
        let metrics = Metrics::new();
        metrics.peer_registered();
        metrics.peer_registered();
        metrics.peer_removed();

        let snap = metrics.snapshot();
        assert_eq!(snap.peers_active, 1);
        assert_eq!(snap.peers_removed, 1);
        assert_eq!(snap.handshakes_success, 2);
    }

    #[test]
    fn test_message_bytes_accumulate() {
        let metrics = Metrics::new();
        metrics.message_received(37);
        metrics.message_received(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.bytes_received, 40);
    }
}
