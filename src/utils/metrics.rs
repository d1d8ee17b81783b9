//! Observability and Metrics
//!
//! Per-router counters for forwarding decisions and protocol events.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector owned by one router
#[derive(Debug)]
pub struct RouterMetrics {
    /// Packets handed to `send`, including fan-out clones
    pub packets_routed: AtomicU64,
    /// Packets handed to a local service or context handler
    pub packets_delivered: AtomicU64,
    /// Packets passed to a channel toward their destination
    pub packets_forwarded: AtomicU64,
    /// Packets dropped as unroutable or unhandled
    pub packets_dropped: AtomicU64,
    /// Received packets whose CRC did not match
    pub crc_mismatches: AtomicU64,
    /// ROUTE advertisements accepted into the table
    pub route_updates: AtomicU64,
    /// Routes deleted by withdrawal or channel loss
    pub route_withdrawals: AtomicU64,
    /// SERVICE advertisements that changed the capacity table
    pub service_updates: AtomicU64,
    /// SERVICE advertisements dropped as already known
    pub service_redundant: AtomicU64,
    /// QUERY requests answered
    pub queries_answered: AtomicU64,
    /// Channels attached
    pub channels_added: AtomicU64,
    /// Channels detached
    pub channels_removed: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl RouterMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            packets_routed: AtomicU64::new(0),
            packets_delivered: AtomicU64::new(0),
            packets_forwarded: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            crc_mismatches: AtomicU64::new(0),
            route_updates: AtomicU64::new(0),
            route_withdrawals: AtomicU64::new(0),
            service_updates: AtomicU64::new(0),
            service_redundant: AtomicU64::new(0),
            queries_answered: AtomicU64::new(0),
            channels_added: AtomicU64::new(0),
            channels_removed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn packet_routed(&self) {
        self.packets_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_delivered(&self) {
        self.packets_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_forwarded(&self) {
        self.packets_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn crc_mismatch(&self) {
        self.crc_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_update(&self) {
        self.route_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` routes deleted at once
    pub fn route_withdrawn(&self, count: u64) {
        self.route_withdrawals.fetch_add(count, Ordering::Relaxed);
    }

    pub fn service_update(&self) {
        self.service_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn service_redundant(&self) {
        self.service_redundant.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_answered(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_added(&self) {
        self.channels_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_removed(&self) {
        self.channels_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            packets_routed: self.packets_routed.load(Ordering::Relaxed),
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            crc_mismatches: self.crc_mismatches.load(Ordering::Relaxed),
            route_updates: self.route_updates.load(Ordering::Relaxed),
            route_withdrawals: self.route_withdrawals.load(Ordering::Relaxed),
            service_updates: self.service_updates.load(Ordering::Relaxed),
            service_redundant: self.service_redundant.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            channels_added: self.channels_added.load(Ordering::Relaxed),
            channels_removed: self.channels_removed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self, address: &str) {
        let s = self.snapshot();
        info!(
            address,
            packets_routed = s.packets_routed,
            packets_delivered = s.packets_delivered,
            packets_forwarded = s.packets_forwarded,
            packets_dropped = s.packets_dropped,
            crc_mismatches = s.crc_mismatches,
            route_updates = s.route_updates,
            route_withdrawals = s.route_withdrawals,
            service_updates = s.service_updates,
            service_redundant = s.service_redundant,
            queries_answered = s.queries_answered,
            channels_added = s.channels_added,
            channels_removed = s.channels_removed,
            uptime_seconds = s.uptime_seconds,
            "Router metrics snapshot"
        );
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    pub packets_routed: u64,
    pub packets_delivered: u64,
    pub packets_forwarded: u64,
    pub packets_dropped: u64,
    pub crc_mismatches: u64,
    pub route_updates: u64,
    pub route_withdrawals: u64,
    pub service_updates: u64,
    pub service_redundant: u64,
    pub queries_answered: u64,
    pub channels_added: u64,
    pub channels_removed: u64,
    pub uptime_seconds: u64,
}
