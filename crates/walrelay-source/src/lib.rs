//! The walrelay reader core.
//!
//! Converts an ever-growing, per-group sequence of WAL files on a
//! shared filesystem into a bounded, back-pressured stream of filtered,
//! ship-ready [`Batch`]es for a downstream shipper.
//!
//! # Key Types
//!
//! - [`LogQueue`] — per-group FIFO of WAL file paths, fed by roll callbacks
//! - [`EntryStream`] — lazy iterator over the concatenation of queued files,
//!   aware that the tail file may still be growing
//! - [`BatchAssembler`] / [`Batch`] — count- and size-bounded accumulation
//! - [`QuotaController`] — process-wide in-flight byte budget shared by all
//!   group readers
//! - [`GroupReader`] — the long-running task tying it all together
//! - [`MetricsSink`] — telemetry boundary, with [`AtomicMetrics`] and
//!   [`NoopMetrics`] implementations
//!
//! # Ordering and durability
//!
//! Within a group, entries reach the ready-queue in strict WAL order and
//! every shipped batch carries the exact `(path, offset)` to resume
//! from. Nothing is persisted here: positions travel with batches, and
//! the coordination layer passes the last durable one back via
//! [`GroupReader::starting_at`] on restart.

pub mod batch;
pub mod config;
pub mod error;
pub mod fs;
pub mod metrics;
pub mod queue;
pub mod quota;
pub mod reader;
pub mod stream;

pub use batch::{Batch, BatchAssembler};
pub use config::SourceConfig;
pub use error::{SourceError, SourceResult};
pub use metrics::{AtomicMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use queue::LogQueue;
pub use quota::QuotaController;
pub use reader::{GroupReader, ReaderHandle};
pub use stream::{EntryStream, StreamStatus};
