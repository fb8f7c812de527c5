//! Process-wide counters for listeners and socket pairs

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics collector
#[derive(Debug, Default)]
pub struct GlobalMetrics {
    /// Listeners opened
    pub listeners_created: AtomicU64,
    /// Listeners that went through their close transition
    pub listeners_closed: AtomicU64,
    /// Dial/accept handoffs completed
    pub pairings: AtomicU64,
    /// Dials abandoned because their token fired
    pub dials_cancelled: AtomicU64,
    /// Dials refused by a closed listener
    pub dials_rejected: AtomicU64,
    /// Accepts refused by a closed listener
    pub accepts_rejected: AtomicU64,
    /// Packet socket pairs created
    pub packet_pairs_created: AtomicU64,
    /// Packet endpoints closed
    pub endpoints_closed: AtomicU64,
    /// Bytes written through packet endpoints
    pub bytes_sent: AtomicU64,
    /// Bytes read through packet endpoints
    pub bytes_received: AtomicU64,
    /// Reads and writes that hit their deadline
    pub timeouts: AtomicU64,
}

impl GlobalMetrics {
    pub fn listener_created(&self) {
        self.listeners_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listener_closed(&self) {
        self.listeners_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pairing(&self) {
        self.pairings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dial_cancelled(&self) {
        self.dials_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dial_rejected(&self) {
        self.dials_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept_rejected(&self) {
        self.accepts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_pair_created(&self) {
        self.packet_pairs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn endpoint_closed(&self) {
        self.endpoints_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            listeners_created: self.listeners_created.load(Ordering::Relaxed),
            listeners_closed: self.listeners_closed.load(Ordering::Relaxed),
            pairings: self.pairings.load(Ordering::Relaxed),
            dials_cancelled: self.dials_cancelled.load(Ordering::Relaxed),
            dials_rejected: self.dials_rejected.load(Ordering::Relaxed),
            accepts_rejected: self.accepts_rejected.load(Ordering::Relaxed),
            packet_pairs_created: self.packet_pairs_created.load(Ordering::Relaxed),
            endpoints_closed: self.endpoints_closed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub listeners_created: u64,
    pub listeners_closed: u64,
    pub pairings: u64,
    pub dials_cancelled: u64,
    pub dials_rejected: u64,
    pub accepts_rejected: u64,
    pub packet_pairs_created: u64,
    pub endpoints_closed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timeouts: u64,
}

impl MetricsSnapshot {
    /// Listeners still open (created but not yet closed)
    pub fn open_listeners(&self) -> u64 {
        self.listeners_created.saturating_sub(self.listeners_closed)
    }

    /// Fraction of dials that ended in a pairing
    pub fn dial_success_rate(&self) -> f64 {
        let attempts = self.pairings + self.dials_cancelled + self.dials_rejected;
        if attempts == 0 {
            0.0
        } else {
            self.pairings as f64 / attempts as f64
        }
    }
}

/// Global metrics instance
pub static GLOBAL_METRICS: std::sync::LazyLock<GlobalMetrics> =
    std::sync::LazyLock::new(GlobalMetrics::default);

/// Get global metrics
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

/// Format metrics for human-readable display
pub fn format_metrics(snapshot: &MetricsSnapshot) -> String {
    format!(
        "SocketPair Metrics:\n\
         Listeners: {} created, {} closed\n\
         Dials: {} paired, {} cancelled, {} rejected (success rate: {:.2}%)\n\
         Accepts rejected: {}\n\
         Packet pairs: {} created, {} endpoints closed\n\
         Traffic: {} bytes sent, {} bytes received\n\
         Timeouts: {}",
        snapshot.listeners_created,
        snapshot.listeners_closed,
        snapshot.pairings,
        snapshot.dials_cancelled,
        snapshot.dials_rejected,
        snapshot.dial_success_rate() * 100.0,
        snapshot.accepts_rejected,
        snapshot.packet_pairs_created,
        snapshot.endpoints_closed,
        snapshot.bytes_sent,
        snapshot.bytes_received,
        snapshot.timeouts,
    )
}
