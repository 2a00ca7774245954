//! Broker-wide counters
//!
//! Updated from many connection tasks concurrently, so everything is a
//! relaxed atomic. Packet drops are expected under slow consumers and are
//! tracked here rather than treated as errors.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for a running broker
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Connections accepted since startup
    pub connections_total: AtomicU64,
    /// Connections currently open
    pub connections_active: AtomicU64,
    /// Packets published by sources
    pub packets_published: AtomicU64,
    /// Packet copies delivered into sink queues
    pub packets_fanned_out: AtomicU64,
    /// Packet copies evicted from sink queues (slow consumers)
    pub packets_dropped: AtomicU64,
    /// Payload bytes received from sources
    pub bytes_in: AtomicU64,
    /// Payload bytes written to sinks
    pub bytes_out: AtomicU64,
}

impl BrokerStats {
    /// Create a zeroed counter set
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn packet_published(&self, bytes: usize, fanned_out: u64, dropped: u64) {
        self.packets_published.fetch_add(1, Ordering::Relaxed);
        self.packets_fanned_out.fetch_add(fanned_out, Ordering::Relaxed);
        self.packets_dropped.fetch_add(dropped, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn packet_delivered(&self, bytes: usize) {
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            packets_published: self.packets_published.load(Ordering::Relaxed),
            packets_fanned_out: self.packets_fanned_out.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BrokerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub packets_published: u64,
    pub packets_fanned_out: u64,
    pub packets_dropped: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let stats = BrokerStats::new();

        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        let snap = stats.snapshot();
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 1);
    }

    #[test]
    fn test_publish_counters() {
        let stats = BrokerStats::new();

        stats.packet_published(100, 3, 1);
        stats.packet_published(50, 0, 0);
        stats.packet_delivered(100);

        let snap = stats.snapshot();
        assert_eq!(snap.packets_published, 2);
        assert_eq!(snap.packets_fanned_out, 3);
        assert_eq!(snap.packets_dropped, 1);
        assert_eq!(snap.bytes_in, 150);
        assert_eq!(snap.bytes_out, 100);
    }
}
