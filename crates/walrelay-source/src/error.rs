use std::io;

use walrelay_wal::WalError;

/// Errors produced by the reader core.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// WAL access failure (I/O, or a corrupt frame).
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    /// I/O error outside the WAL crate (metadata lookups and the like).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The downstream consumer dropped the ready-queue receiver.
    #[error("ready queue closed")]
    ReadyQueueClosed,
}

impl SourceError {
    /// Returns `true` for errors that end the group (corrupt data or a
    /// departed consumer). Everything else is retried with backoff.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Wal(WalError::Corrupt { .. }) | Self::ReadyQueueClosed
        )
    }
}

/// Convenience alias used throughout the reader core.
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_and_closed_are_fatal() {
        let corrupt = SourceError::Wal(WalError::Corrupt {
            path: "a.wal".into(),
            offset: 0,
            reason: "crc".into(),
        });
        assert!(corrupt.is_fatal());
        assert!(SourceError::ReadyQueueClosed.is_fatal());
    }

    #[test]
    fn io_is_transient() {
        let nf = SourceError::Wal(WalError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "missing",
        )));
        assert!(!nf.is_fatal());
    }
}
