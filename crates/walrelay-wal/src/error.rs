use std::io;
use std::path::PathBuf;

/// Errors produced by WAL file access.
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// I/O error from the underlying filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame failed its integrity checks. Non-retryable for this file.
    #[error("corrupt frame in {path} at offset {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// An entry could not be serialized for appending.
    #[error("entry encoding failed: {0}")]
    Encoding(String),
}

impl WalError {
    /// Returns `true` for a missing-file error, which the reader core
    /// treats as transient (the path may not be visible on the shared
    /// filesystem yet).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// Convenience alias used throughout the WAL crate.
pub type WalResult<T> = Result<T, WalError>;
