use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use walrelay_types::{Position, WalEntry};
use walrelay_wal::{EntryReader, ReadOutcome, ReaderFactory};

use crate::error::SourceResult;
use crate::fs;
use crate::metrics::MetricsSink;
use crate::queue::LogQueue;

/// What the stream produced on one step, consumed by a `match` in the
/// group reader loop.
#[derive(Debug)]
pub enum StreamStatus {
    /// The next entry, in strict WAL order.
    Entry(WalEntry),
    /// Clean EOF on the current file with nowhere to go: the file has
    /// not grown, and it is either the sole file of a live queue or a
    /// zero-length head (which the stream never advances past itself).
    SameFileEof,
    /// The current file was fully consumed and dequeued; the stream is
    /// now at offset 0 of its successor. Reported once per advance so
    /// the caller can seal the in-flight batch at the file boundary.
    Rolled,
    /// Recovered queue only: the last file was fully consumed and
    /// dequeued; the queue is empty.
    Drained,
    /// A partial frame at the tail of the current file. The position is
    /// unchanged; retry later.
    Truncated,
}

/// Lazy iterator over the concatenation of the files in a [`LogQueue`],
/// starting at an initial position.
///
/// The stream owns the only cursor into the group's WAL files. It
/// transparently keeps reading when the current file grows, reports
/// rolls and drains as distinct statuses, and exposes the exact frame
/// boundary after every yielded entry. Positions are monotonic within a
/// file and restart at 0 on advance.
pub struct EntryStream {
    queue: Arc<LogQueue>,
    factory: Arc<dyn ReaderFactory>,
    metrics: Arc<dyn MetricsSink>,
    recovered: bool,
    fs_op_timeout: Duration,
    current_path: PathBuf,
    offset: u64,
    reader: Option<Box<dyn EntryReader>>,
}

impl EntryStream {
    pub fn new(
        queue: Arc<LogQueue>,
        factory: Arc<dyn ReaderFactory>,
        metrics: Arc<dyn MetricsSink>,
        start: Position,
        recovered: bool,
        fs_op_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            factory,
            metrics,
            recovered,
            fs_op_timeout,
            current_path: start.path,
            offset: start.offset,
            reader: None,
        }
    }

    /// Frame boundary after the last yielded entry.
    pub fn position(&self) -> Position {
        Position::new(self.current_path.clone(), self.offset)
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Close the cursor; the next step reopens it at the same boundary.
    /// Called after a batch ships so the reader's buffers are released.
    pub fn reset(&mut self) {
        if self.reader.take().is_some() {
            self.metrics.incr_restarted_wal_reading();
        }
    }

    /// Produce the next status. Opening a queued path that is not yet
    /// visible on the shared filesystem surfaces as a retryable error.
    pub async fn next(&mut self) -> SourceResult<StreamStatus> {
        loop {
            let outcome = self.ensure_reader()?.read_next()?;
            match outcome {
                ReadOutcome::Entry(entry) => {
                    let after = self
                        .reader
                        .as_ref()
                        .expect("reader present after read")
                        .position();
                    self.metrics.incr_log_edits_read(1);
                    self.metrics.incr_log_read_bytes(after - self.offset);
                    self.offset = after;
                    return Ok(StreamStatus::Entry(entry));
                }
                ReadOutcome::Eof => match self.on_clean_eof().await? {
                    Some(status) => return Ok(status),
                    // The file grew since the cursor hit EOF; keep reading.
                    None => continue,
                },
                ReadOutcome::Truncated => return Ok(StreamStatus::Truncated),
            }
        }
    }

    fn ensure_reader(&mut self) -> SourceResult<&mut Box<dyn EntryReader>> {
        if self.reader.is_none() {
            let reader = self.factory.open(&self.current_path, self.offset)?;
            debug!(path = %self.current_path.display(), offset = self.offset, "wal cursor opened");
            self.reader = Some(reader);
        }
        Ok(self.reader.as_mut().expect("reader just opened"))
    }

    /// Decide what a clean EOF on the current file means. `None` means
    /// "more bytes exist, keep reading".
    async fn on_clean_eof(&mut self) -> SourceResult<Option<StreamStatus>> {
        let Some(len) = fs::file_len(&self.current_path, self.fs_op_timeout).await else {
            self.metrics.incr_unknown_file_length_for_closed_wal();
            return Ok(Some(StreamStatus::SameFileEof));
        };

        if len > self.offset {
            return Ok(None);
        }
        if len < self.offset {
            warn!(
                path = %self.current_path.display(),
                len,
                position = self.offset,
                "wal shrank under the reader"
            );
            return Ok(Some(StreamStatus::SameFileEof));
        }
        if len == 0 {
            // Possibly an unclean writer shutdown; only the reader
            // loop's autorecovery policy may discard a zero-length head.
            return Ok(Some(StreamStatus::SameFileEof));
        }

        if self.queue.len() > 1 {
            return self.confirm_roll().await;
        }

        if self.recovered {
            self.queue.remove_head();
            self.metrics.incr_completed_wal();
            self.reader = None;
            info!(path = %self.current_path.display(), "recovered queue drained");
            return Ok(Some(StreamStatus::Drained));
        }

        Ok(Some(StreamStatus::SameFileEof))
    }

    /// A successor in the queue means the head has been sealed, but the
    /// seal may have happened after the first length lookup. Re-check
    /// the length before advancing; a stale lookup must not hide tail
    /// bytes.
    async fn confirm_roll(&mut self) -> SourceResult<Option<StreamStatus>> {
        let Some(len) = fs::file_len(&self.current_path, self.fs_op_timeout).await else {
            self.metrics.incr_unknown_file_length_for_closed_wal();
            return Ok(Some(StreamStatus::SameFileEof));
        };
        if len > self.offset {
            return Ok(None);
        }
        if len < self.offset {
            warn!(
                path = %self.current_path.display(),
                len,
                position = self.offset,
                "wal shrank under the reader"
            );
            return Ok(Some(StreamStatus::SameFileEof));
        }

        self.queue.remove_head();
        self.metrics.incr_completed_wal();
        let Some(next) = self.queue.head() else {
            // Producers only append, so a successor observed above can
            // only have been consumed by us. Stay put and retry.
            warn!(path = %self.current_path.display(), "successor vanished from queue");
            return Ok(Some(StreamStatus::SameFileEof));
        };

        info!(
            finished = %self.current_path.display(),
            next = %next.display(),
            "advancing to next wal"
        );
        self.current_path = next;
        self.offset = 0;
        self.reader = None;
        Ok(Some(StreamStatus::Rolled))
    }
}
