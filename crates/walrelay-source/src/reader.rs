use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use walrelay_filter::{EntryFilter, FilterChain};
use walrelay_types::Position;
use walrelay_wal::{CursorFactory, ReaderFactory};

use crate::batch::{Batch, BatchAssembler};
use crate::config::SourceConfig;
use crate::error::{SourceError, SourceResult};
use crate::fs;
use crate::metrics::MetricsSink;
use crate::queue::LogQueue;
use crate::quota::QuotaController;
use crate::stream::{EntryStream, StreamStatus};

/// How often a blocked ship or a long sleep re-checks the running flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Why one batch-assembly pass ended.
enum BatchEnd {
    /// A per-batch cap or the process quota closed the batch.
    Full,
    /// Clean EOF with nothing to advance to (live tail caught up, or a
    /// zero-length head).
    Idle,
    /// The stream advanced into the next file.
    Rolled,
    /// The recovered queue is fully consumed.
    Drained,
    /// Partial frame at the tail of the current file.
    Truncated,
    /// The stream failed; the batch holds whatever was read before.
    Error(SourceError),
}

enum ShipOutcome {
    Shipped,
    /// The reader was stopped while the ready-queue was full.
    Stopped(Batch),
    /// The consumer dropped the receiver.
    Closed(Batch),
}

/// The long-running tailing reader for one WAL group.
///
/// Drives [`EntryStream`] → filter chain → [`BatchAssembler`] → the
/// bounded ready-queue, and is the sole mutator of the group's read
/// position. Construct with [`GroupReader::new`], adjust with the
/// builder methods, then [`GroupReader::spawn`].
pub struct GroupReader {
    group: String,
    queue: Arc<LogQueue>,
    factory: Arc<dyn ReaderFactory>,
    filters: FilterChain,
    quota: Arc<QuotaController>,
    metrics: Arc<dyn MetricsSink>,
    config: SourceConfig,
    recovered: bool,
    peer_enabled: Arc<AtomicBool>,
    start: Option<Position>,
    running: Arc<AtomicBool>,
}

impl GroupReader {
    pub fn new(
        group: impl Into<String>,
        queue: Arc<LogQueue>,
        quota: Arc<QuotaController>,
        metrics: Arc<dyn MetricsSink>,
        config: SourceConfig,
    ) -> Self {
        Self {
            group: group.into(),
            queue,
            factory: Arc::new(CursorFactory),
            filters: FilterChain::new(),
            quota,
            metrics,
            config,
            recovered: false,
            peer_enabled: Arc::new(AtomicBool::new(true)),
            start: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Substitute the cursor factory (tests, alternative formats).
    pub fn with_factory(mut self, factory: Arc<dyn ReaderFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Observe peer state through a shared flag instead of a back
    /// reference to the owning source.
    pub fn with_peer_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.peer_enabled = flag;
        self
    }

    /// Mark the queue as inherited from a failed peer: finite, never
    /// appended to, and drained to completion.
    pub fn recovered(mut self, recovered: bool) -> Self {
        self.recovered = recovered;
        self
    }

    /// Resume at a previously shipped position instead of the queue head.
    pub fn starting_at(mut self, position: Position) -> Self {
        self.start = Some(position);
        self
    }

    /// Start the reader task. Returns a control handle and the receiving
    /// end of the bounded ready-queue the shipper consumes from.
    pub fn spawn(self) -> (ReaderHandle, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(self.config.batch_queue_capacity.max(1));
        let group = self.group.clone();
        let running = Arc::clone(&self.running);
        let task = tokio::spawn(self.run(tx));
        (
            ReaderHandle {
                group,
                running,
                task,
            },
            rx,
        )
    }

    async fn run(mut self, tx: mpsc::Sender<Batch>) -> SourceResult<()> {
        info!(group = %self.group, recovered = self.recovered, "wal group reader started");
        let assembler = BatchAssembler::new(&self.config);
        let mut backoff = Backoff::new(self.config.retry_sleep(), self.config.retry_max_multiplier);
        let mut position = self.start.take();
        let mut stream: Option<EntryStream> = None;

        while self.running() {
            if !self.peer_enabled() {
                trace!(group = %self.group, "peer disabled");
                self.sleep_checked(self.config.retry_sleep()).await;
                continue;
            }
            if !self.quota.acquire_check() {
                debug!(group = %self.group, used = self.quota.used(), "over quota, holding off");
                self.sleep_checked(self.config.retry_sleep()).await;
                continue;
            }

            if self.queue.is_empty() {
                if self.recovered {
                    self.metrics.incr_completed_recovery_queue();
                    self.running.store(false, Ordering::Relaxed);
                    info!(group = %self.group, "recovered queue empty, stopping");
                    break;
                }
                self.sleep_checked(backoff.next()).await;
                continue;
            }

            self.update_oldest_wal_age().await;

            if stream.is_none() {
                let start = match &position {
                    Some(p) => p.clone(),
                    None => match self.queue.head() {
                        Some(head) => Position::start_of(head),
                        None => continue,
                    },
                };
                stream = Some(EntryStream::new(
                    Arc::clone(&self.queue),
                    Arc::clone(&self.factory),
                    Arc::clone(&self.metrics),
                    start,
                    self.recovered,
                    self.config.fs_op_timeout(),
                ));
            }

            let (mut batch, end) = self
                .read_batch(stream.as_mut().expect("stream present"), &assembler)
                .await;

            match end {
                BatchEnd::Full | BatchEnd::Rolled => {
                    let s = stream.as_mut().expect("stream present");
                    self.ship_and_advance(&tx, batch, s, &mut position).await?;
                    backoff.reset();
                }
                BatchEnd::Idle => {
                    if batch.is_empty() {
                        if !self.try_autorecover(&mut stream, &mut position).await {
                            self.sleep_checked(backoff.next()).await;
                        }
                    } else {
                        let s = stream.as_mut().expect("stream present");
                        self.ship_and_advance(&tx, batch, s, &mut position).await?;
                        backoff.reset();
                    }
                }
                BatchEnd::Drained => {
                    batch.set_more_entries(false);
                    let s = stream.as_mut().expect("stream present");
                    self.ship_and_advance(&tx, batch, s, &mut position).await?;
                    self.metrics.incr_completed_recovery_queue();
                    self.running.store(false, Ordering::Relaxed);
                    info!(group = %self.group, "recovered queue fully replayed, stopping");
                    break;
                }
                BatchEnd::Truncated => {
                    if !batch.is_empty() {
                        let s = stream.as_mut().expect("stream present");
                        self.ship_and_advance(&tx, batch, s, &mut position).await?;
                    }
                    if !self.try_autorecover(&mut stream, &mut position).await {
                        trace!(group = %self.group, "truncated tail, backing off");
                        self.sleep_checked(backoff.next()).await;
                    }
                }
                BatchEnd::Error(e) => {
                    if !batch.is_empty() {
                        let s = stream.as_mut().expect("stream present");
                        // Partial batches are never discarded; positions in
                        // them are exact.
                        let shipped = self.ship_and_advance(&tx, batch, s, &mut position).await;
                        if e.is_fatal() {
                            let _ = shipped;
                        } else {
                            shipped?;
                        }
                    }
                    if e.is_fatal() {
                        error!(group = %self.group, error = %e, "wal group reader failed");
                        return Err(e);
                    }
                    warn!(group = %self.group, error = %e, "transient read failure, backing off");
                    stream = None;
                    self.sleep_checked(backoff.next()).await;
                }
            }
        }

        info!(group = %self.group, "wal group reader stopped");
        Ok(())
    }

    /// Assemble one batch. Never returns mid-file except on a cap; the
    /// batch therefore never spans a file boundary.
    async fn read_batch(
        &self,
        stream: &mut EntryStream,
        assembler: &BatchAssembler,
    ) -> (Batch, BatchEnd) {
        let mut batch = assembler.start(stream.position());
        loop {
            match stream.next().await {
                Ok(StreamStatus::Entry(entry)) => {
                    let Some(entry) = self.filters.filter(entry) else {
                        self.metrics.incr_log_edits_filtered(1);
                        continue;
                    };
                    if entry.is_empty() {
                        self.metrics.incr_log_edits_filtered(1);
                        continue;
                    }
                    let quota_size = assembler.push(&mut batch, entry);
                    let over = self.quota.add(quota_size);
                    if over || assembler.is_full(&batch) {
                        return (batch, BatchEnd::Full);
                    }
                }
                Ok(StreamStatus::SameFileEof) => return (batch, BatchEnd::Idle),
                Ok(StreamStatus::Rolled) => return (batch, BatchEnd::Rolled),
                Ok(StreamStatus::Drained) => return (batch, BatchEnd::Drained),
                Ok(StreamStatus::Truncated) => return (batch, BatchEnd::Truncated),
                Err(e) => return (batch, BatchEnd::Error(e)),
            }
        }
    }

    /// Seal the batch at the stream's position and hand it to the
    /// ready-queue, blocking while the queue is full. On success the
    /// resume position advances and the stream's cursor is released.
    async fn ship_and_advance(
        &self,
        tx: &mpsc::Sender<Batch>,
        mut batch: Batch,
        stream: &mut EntryStream,
        position: &mut Option<Position>,
    ) -> SourceResult<()> {
        let end = stream.position();
        batch.set_end_position(end.clone());
        let entries = batch.entry_count();
        let write_time = batch.last_write_time_ms();

        match self.ship(tx, batch).await {
            ShipOutcome::Shipped => {
                debug!(group = %self.group, entries, end = %end, "batch shipped");
                if write_time > 0 {
                    self.metrics
                        .set_age_of_last_shipped_op_ms(fs::now_ms().saturating_sub(write_time));
                }
                *position = Some(end);
                stream.reset();
                Ok(())
            }
            ShipOutcome::Stopped(batch) => {
                self.quota.release(batch.quota_size());
                Ok(())
            }
            ShipOutcome::Closed(batch) => {
                self.quota.release(batch.quota_size());
                Err(SourceError::ReadyQueueClosed)
            }
        }
    }

    async fn ship(&self, tx: &mpsc::Sender<Batch>, mut batch: Batch) -> ShipOutcome {
        loop {
            if !self.running() {
                return ShipOutcome::Stopped(batch);
            }
            match tx.send_timeout(batch, STOP_POLL_INTERVAL).await {
                Ok(()) => return ShipOutcome::Shipped,
                Err(SendTimeoutError::Timeout(returned)) => batch = returned,
                Err(SendTimeoutError::Closed(returned)) => return ShipOutcome::Closed(returned),
            }
        }
    }

    /// Discard a zero-length head left behind by an unclean writer
    /// shutdown, when the policy allows it. Returns `true` if the queue
    /// advanced. The sole file of a live queue is never removed, and a
    /// non-zero truncated tail is never skipped.
    async fn try_autorecover(
        &self,
        stream: &mut Option<EntryStream>,
        position: &mut Option<Position>,
    ) -> bool {
        if !self.config.eof_autorecovery {
            return false;
        }
        if !(self.recovered || self.queue.len() > 1) {
            return false;
        }
        let Some(head) = self.queue.head() else {
            return false;
        };
        let Some(len) = fs::file_len(&head, self.config.fs_op_timeout()).await else {
            self.metrics.incr_unknown_file_length_for_closed_wal();
            return false;
        };
        if len != 0 {
            return false;
        }

        self.queue.remove_head();
        self.metrics.incr_uncleanly_closed_wals();
        self.metrics.incr_bytes_skipped_in_uncleanly_closed_wals(len);
        warn!(
            group = %self.group,
            path = %head.display(),
            "discarded zero-length wal left by unclean shutdown"
        );

        *stream = None;
        *position = self.queue.head().map(Position::start_of);
        true
    }

    async fn update_oldest_wal_age(&self) {
        if let Some(head) = self.queue.head() {
            if let Some(mtime) = fs::file_mtime_ms(&head, self.config.fs_op_timeout()).await {
                self.metrics
                    .set_oldest_wal_age_ms(fs::now_ms().saturating_sub(mtime));
            }
        }
    }

    /// Sleep in short slices so a stop request is honored promptly.
    async fn sleep_checked(&self, duration: Duration) {
        let deadline = tokio::time::Instant::now() + duration;
        while self.running() {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(STOP_POLL_INTERVAL)).await;
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn peer_enabled(&self) -> bool {
        self.peer_enabled.load(Ordering::Relaxed)
    }
}

/// Control handle for a spawned [`GroupReader`].
pub struct ReaderHandle {
    group: String,
    running: Arc<AtomicBool>,
    task: JoinHandle<SourceResult<()>>,
}

impl ReaderHandle {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Request a clean stop. Any in-flight unshipped batch releases its
    /// quota bytes on the way out.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit and surface its result.
    pub async fn join(self) -> SourceResult<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SourceError::Io(std::io::Error::other(e))),
        }
    }
}

/// Capped exponential retry backoff: `base * multiplier`, the
/// multiplier doubling per fruitless round up to a cap, reset on
/// progress.
struct Backoff {
    base: Duration,
    max_multiplier: u32,
    multiplier: u32,
}

impl Backoff {
    fn new(base: Duration, max_multiplier: u32) -> Self {
        Self {
            base,
            max_multiplier: max_multiplier.max(1),
            multiplier: 1,
        }
    }

    fn next(&mut self) -> Duration {
        let sleep = self.base * self.multiplier;
        self.multiplier = self.multiplier.saturating_mul(2).min(self.max_multiplier);
        sleep
    }

    fn reset(&mut self) {
        self.multiplier = 1;
    }
}
