use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Telemetry updated by the reader core and consumed by an operator UI.
///
/// Injected as an `Arc<dyn MetricsSink>` everywhere. There is no global
/// registry, so tests substitute [`AtomicMetrics`] or [`NoopMetrics`]
/// freely.
pub trait MetricsSink: Send + Sync {
    /// Gauge: current length of the group's log queue.
    fn set_size_of_log_queue(&self, size: u64);
    /// Gauge: now minus the head file's modification time.
    fn set_oldest_wal_age_ms(&self, age_ms: u64);
    /// Gauge: now minus the write time of the last entry handed to the
    /// shipper.
    fn set_age_of_last_shipped_op_ms(&self, age_ms: u64);
    /// Counter: entries yielded by the entry stream.
    fn incr_log_edits_read(&self, n: u64);
    /// Counter: entries dropped by the filter chain.
    fn incr_log_edits_filtered(&self, n: u64);
    /// Counter: bytes consumed from WAL files.
    fn incr_log_read_bytes(&self, n: u64);
    /// Counter: file-length lookups that failed or timed out.
    fn incr_unknown_file_length_for_closed_wal(&self);
    /// Counter: zero-length heads force-removed by EOF autorecovery.
    fn incr_uncleanly_closed_wals(&self);
    /// Counter: bytes skipped by such removals.
    fn incr_bytes_skipped_in_uncleanly_closed_wals(&self, n: u64);
    /// Counter: entry-stream re-opens.
    fn incr_restarted_wal_reading(&self);
    /// Counter: WAL files fully consumed and dequeued.
    fn incr_completed_wal(&self);
    /// Counter: recovered queues fully drained.
    fn incr_completed_recovery_queue(&self);
}

/// A [`MetricsSink`] that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_size_of_log_queue(&self, _size: u64) {}
    fn set_oldest_wal_age_ms(&self, _age_ms: u64) {}
    fn set_age_of_last_shipped_op_ms(&self, _age_ms: u64) {}
    fn incr_log_edits_read(&self, _n: u64) {}
    fn incr_log_edits_filtered(&self, _n: u64) {}
    fn incr_log_read_bytes(&self, _n: u64) {}
    fn incr_unknown_file_length_for_closed_wal(&self) {}
    fn incr_uncleanly_closed_wals(&self) {}
    fn incr_bytes_skipped_in_uncleanly_closed_wals(&self, _n: u64) {}
    fn incr_restarted_wal_reading(&self) {}
    fn incr_completed_wal(&self) {}
    fn incr_completed_recovery_queue(&self) {}
}

/// Atomic in-process [`MetricsSink`] with a readable snapshot.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    size_of_log_queue: AtomicU64,
    oldest_wal_age_ms: AtomicU64,
    age_of_last_shipped_op_ms: AtomicU64,
    log_edits_read: AtomicU64,
    log_edits_filtered: AtomicU64,
    log_read_bytes: AtomicU64,
    unknown_file_length_for_closed_wal: AtomicU64,
    uncleanly_closed_wals: AtomicU64,
    bytes_skipped_in_uncleanly_closed_wals: AtomicU64,
    restarted_wal_reading: AtomicU64,
    completed_wal: AtomicU64,
    completed_recovery_queue: AtomicU64,
}

/// Point-in-time copy of every metric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub size_of_log_queue: u64,
    pub oldest_wal_age_ms: u64,
    pub age_of_last_shipped_op_ms: u64,
    pub log_edits_read: u64,
    pub log_edits_filtered: u64,
    pub log_read_bytes: u64,
    pub unknown_file_length_for_closed_wal: u64,
    pub uncleanly_closed_wals: u64,
    pub bytes_skipped_in_uncleanly_closed_wals: u64,
    pub restarted_wal_reading: u64,
    pub completed_wal: u64,
    pub completed_recovery_queue: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            size_of_log_queue: self.size_of_log_queue.load(Ordering::Relaxed),
            oldest_wal_age_ms: self.oldest_wal_age_ms.load(Ordering::Relaxed),
            age_of_last_shipped_op_ms: self.age_of_last_shipped_op_ms.load(Ordering::Relaxed),
            log_edits_read: self.log_edits_read.load(Ordering::Relaxed),
            log_edits_filtered: self.log_edits_filtered.load(Ordering::Relaxed),
            log_read_bytes: self.log_read_bytes.load(Ordering::Relaxed),
            unknown_file_length_for_closed_wal: self
                .unknown_file_length_for_closed_wal
                .load(Ordering::Relaxed),
            uncleanly_closed_wals: self.uncleanly_closed_wals.load(Ordering::Relaxed),
            bytes_skipped_in_uncleanly_closed_wals: self
                .bytes_skipped_in_uncleanly_closed_wals
                .load(Ordering::Relaxed),
            restarted_wal_reading: self.restarted_wal_reading.load(Ordering::Relaxed),
            completed_wal: self.completed_wal.load(Ordering::Relaxed),
            completed_recovery_queue: self.completed_recovery_queue.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for AtomicMetrics {
    fn set_size_of_log_queue(&self, size: u64) {
        self.size_of_log_queue.store(size, Ordering::Relaxed);
    }

    fn set_oldest_wal_age_ms(&self, age_ms: u64) {
        self.oldest_wal_age_ms.store(age_ms, Ordering::Relaxed);
    }

    fn set_age_of_last_shipped_op_ms(&self, age_ms: u64) {
        self.age_of_last_shipped_op_ms.store(age_ms, Ordering::Relaxed);
    }

    fn incr_log_edits_read(&self, n: u64) {
        self.log_edits_read.fetch_add(n, Ordering::Relaxed);
    }

    fn incr_log_edits_filtered(&self, n: u64) {
        self.log_edits_filtered.fetch_add(n, Ordering::Relaxed);
    }

    fn incr_log_read_bytes(&self, n: u64) {
        self.log_read_bytes.fetch_add(n, Ordering::Relaxed);
    }

    fn incr_unknown_file_length_for_closed_wal(&self) {
        self.unknown_file_length_for_closed_wal
            .fetch_add(1, Ordering::Relaxed);
    }

    fn incr_uncleanly_closed_wals(&self) {
        self.uncleanly_closed_wals.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_bytes_skipped_in_uncleanly_closed_wals(&self, n: u64) {
        self.bytes_skipped_in_uncleanly_closed_wals
            .fetch_add(n, Ordering::Relaxed);
    }

    fn incr_restarted_wal_reading(&self) {
        self.restarted_wal_reading.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_completed_wal(&self) {
        self.completed_wal.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_completed_recovery_queue(&self) {
        self.completed_recovery_queue.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_gauges_overwrite() {
        let m = AtomicMetrics::new();
        m.incr_log_edits_read(3);
        m.incr_log_edits_read(2);
        m.set_size_of_log_queue(7);
        m.set_size_of_log_queue(4);

        let snap = m.snapshot();
        assert_eq!(snap.log_edits_read, 5);
        assert_eq!(snap.size_of_log_queue, 4);
    }

    #[test]
    fn snapshot_starts_zeroed() {
        assert_eq!(AtomicMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
