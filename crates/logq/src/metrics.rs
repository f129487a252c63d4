use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use serde::Serialize;

/// Forces the wrapped counters onto their own cache line so the listener
/// and the workers do not invalidate each other's L1 lines.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Listener-side counters (updated by connection handlers).
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicI64,
    pub received: AtomicU64,
    pub oversized: AtomicU64,
    pub unparsed: AtomicU64,
}

/// Worker-side counters (updated once per record).
#[derive(Debug, Default)]
pub struct SinkCounters {
    pub appended: AtomicU64,
    pub encode_failures: AtomicU64,
    pub append_failures: AtomicU64,
}

/// Counters for the whole ingestion pipeline.
///
/// All operations use `Ordering::Relaxed`; a snapshot may tear across
/// groups, which is fine for reporting.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub source: CacheAligned<SourceCounters>,
    pub sink: CacheAligned<SinkCounters>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Source ---

    #[inline]
    pub fn connection_opened(&self) {
        self.source.0.connections_total.fetch_add(1, Ordering::Relaxed);
        self.source.0.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.source.0.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A record was handed to the dispatch channel.
    #[inline]
    pub fn record_received(&self) {
        self.source.0.received.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame exceeded the size limit and was discarded.
    #[inline]
    pub fn frame_oversized(&self) {
        self.source.0.oversized.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame did not parse as syslog and was forwarded raw.
    #[inline]
    pub fn frame_unparsed(&self) {
        self.source.0.unparsed.fetch_add(1, Ordering::Relaxed);
    }

    // --- Sink ---

    #[inline]
    pub fn record_appended(&self) {
        self.sink.0.appended.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn encode_failed(&self) {
        self.sink.0.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn append_failed(&self) {
        self.sink.0.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.source.0.connections_total.load(Ordering::Relaxed),
            connections_active: self.source.0.connections_active.load(Ordering::Relaxed),
            received: self.source.0.received.load(Ordering::Relaxed),
            oversized: self.source.0.oversized.load(Ordering::Relaxed),
            unparsed: self.source.0.unparsed.load(Ordering::Relaxed),
            appended: self.sink.0.appended.load(Ordering::Relaxed),
            encode_failures: self.sink.0.encode_failures.load(Ordering::Relaxed),
            append_failures: self.sink.0.append_failures.load(Ordering::Relaxed),
        }
    }
}

/// A read-only copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: i64,
    pub received: u64,
    pub oversized: u64,
    pub unparsed: u64,
    pub appended: u64,
    pub encode_failures: u64,
    pub append_failures: u64,
}

impl MetricsSnapshot {
    /// Records that reached a worker and were either appended or dropped.
    pub fn processed(&self) -> u64 {
        self.appended + self.encode_failures + self.append_failures
    }

    /// Records still in the channel or in flight inside a worker.
    pub fn pending(&self) -> u64 {
        self.received.saturating_sub(self.processed())
    }
}
