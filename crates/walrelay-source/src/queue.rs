use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::metrics::MetricsSink;

/// Per-group FIFO of WAL file paths.
///
/// Producers are WAL-roll callbacks on writer threads appending at the
/// tail; the single consumer is the group's reader removing the head
/// after advancing past its end. Insertion order is never reordered.
pub struct LogQueue {
    inner: Mutex<VecDeque<PathBuf>>,
    metrics: Arc<dyn MetricsSink>,
}

impl LogQueue {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            metrics,
        }
    }

    /// Seed a queue with an ordered set of already-known paths (used for
    /// recovered queues inherited from a failed peer).
    pub fn with_paths(
        metrics: Arc<dyn MetricsSink>,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let queue = Self::new(metrics);
        for path in paths {
            queue.push(path);
        }
        queue
    }

    /// Append a freshly rolled WAL file at the tail.
    pub fn push(&self, path: PathBuf) {
        let mut inner = self.inner.lock().expect("log queue lock poisoned");
        debug!(path = %path.display(), "wal enqueued");
        inner.push_back(path);
        self.metrics.set_size_of_log_queue(inner.len() as u64);
    }

    /// The file currently being (or next to be) read.
    pub fn head(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .expect("log queue lock poisoned")
            .front()
            .cloned()
    }

    /// Drop the head. Only the owning reader calls this, after advancing
    /// past the file's end (or when autorecovery discards a zero-length
    /// head).
    pub fn remove_head(&self) -> Option<PathBuf> {
        let mut inner = self.inner.lock().expect("log queue lock poisoned");
        let removed = inner.pop_front();
        if let Some(path) = &removed {
            debug!(path = %path.display(), remaining = inner.len(), "wal dequeued");
        }
        self.metrics.set_size_of_log_queue(inner.len() as u64);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("log queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AtomicMetrics;

    #[test]
    fn fifo_order_preserved() {
        let queue = LogQueue::new(Arc::new(AtomicMetrics::new()));
        queue.push("a.wal".into());
        queue.push("b.wal".into());
        queue.push("c.wal".into());

        assert_eq!(queue.head(), Some("a.wal".into()));
        assert_eq!(queue.remove_head(), Some("a.wal".into()));
        assert_eq!(queue.remove_head(), Some("b.wal".into()));
        assert_eq!(queue.head(), Some("c.wal".into()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn gauge_tracks_mutations() {
        let metrics = Arc::new(AtomicMetrics::new());
        let queue = LogQueue::new(Arc::clone(&metrics) as Arc<dyn MetricsSink>);
        queue.push("a.wal".into());
        queue.push("b.wal".into());
        assert_eq!(metrics.snapshot().size_of_log_queue, 2);
        queue.remove_head();
        assert_eq!(metrics.snapshot().size_of_log_queue, 1);
    }

    #[test]
    fn seeded_queue_counts() {
        let metrics = Arc::new(AtomicMetrics::new());
        let queue = LogQueue::with_paths(
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            [PathBuf::from("a.wal"), PathBuf::from("b.wal")],
        );
        assert_eq!(queue.len(), 2);
        assert_eq!(metrics.snapshot().size_of_log_queue, 2);
    }

    #[test]
    fn concurrent_producers_single_consumer() {
        let queue = Arc::new(LogQueue::new(Arc::new(AtomicMetrics::new())));
        let mut handles = Vec::new();
        for i in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for j in 0..25 {
                    queue.push(format!("{i}-{j}.wal").into());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.len(), 100);
    }
}
