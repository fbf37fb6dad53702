use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one replication source (all WAL group readers of a
/// process share the quota; the rest applies per group).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Per-batch heap cap in bytes (WAL edits plus referenced bulk-load
    /// bytes).
    pub batch_size_capacity: u64,
    /// Per-batch entry cap.
    pub batch_count_capacity: usize,
    /// Depth of the ready-queue between reader and shipper.
    pub batch_queue_capacity: usize,
    /// Process-wide cap on in-flight batch bytes (excluding bulk-load
    /// bytes, which the reader does not buffer).
    pub quota_bytes: u64,
    /// Base retry/idle sleep in milliseconds.
    pub retry_sleep_ms: u64,
    /// Cap on the backoff multiplier.
    pub retry_max_multiplier: u32,
    /// Allow force-removing zero-length head files left behind by an
    /// unclean writer shutdown.
    pub eof_autorecovery: bool,
    /// Timeout for shared-filesystem metadata calls in milliseconds.
    pub fs_op_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            batch_size_capacity: 64 * 1024 * 1024,
            batch_count_capacity: 25_000,
            batch_queue_capacity: 1,
            quota_bytes: 256 * 1024 * 1024,
            retry_sleep_ms: 1_000,
            retry_max_multiplier: 300,
            eof_autorecovery: false,
            fs_op_timeout_ms: 5_000,
        }
    }
}

impl SourceConfig {
    pub fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep_ms)
    }

    pub fn fs_op_timeout(&self) -> Duration {
        Duration::from_millis(self.fs_op_timeout_ms)
    }
}
