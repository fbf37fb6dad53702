use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use walrelay_types::WalEntry;

use crate::error::WalResult;
use crate::frame::encode_frame;

/// Append-only writer for a single WAL file.
///
/// Used by the test suite and the demo CLI to stand in for the store's
/// write path. Rolling is the caller's job: create a new file with a new
/// `WalWriter` and enqueue its path with the group's log queue.
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Current write offset, i.e. the frame boundary after the last append.
    offset: u64,
}

impl WalWriter {
    /// Open (or create) the WAL file at the given path, appending at its
    /// current end.
    pub fn open(path: &Path) -> WalResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset,
        })
    }

    /// Append a single entry. Returns the frame boundary *after* the
    /// appended entry (the position a resumed reader would report).
    pub fn append(&mut self, entry: &WalEntry) -> WalResult<u64> {
        let frame = encode_frame(entry)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        self.offset += frame.len() as u64;

        debug!(path = %self.path.display(), offset = self.offset, len = frame.len(), "WAL append");
        Ok(self.offset)
    }

    /// Force the file contents to stable storage.
    pub fn sync(&mut self) -> WalResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Current length of the file (frame boundary after the last append).
    pub fn len(&self) -> u64 {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrelay_types::Cell;

    fn entry(row: &str) -> WalEntry {
        WalEntry::new("t", 1_000).with_cell(Cell::new(
            row.as_bytes().to_vec(),
            b"fam".to_vec(),
            b"q".to_vec(),
            b"v".to_vec(),
        ))
    }

    #[test]
    fn append_advances_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = WalWriter::open(&dir.path().join("a.wal")).unwrap();
        assert!(writer.is_empty());

        let end1 = writer.append(&entry("a")).unwrap();
        let end2 = writer.append(&entry("b")).unwrap();
        assert!(end1 > 0);
        assert!(end2 > end1);
        assert_eq!(writer.len(), end2);
    }

    #[test]
    fn reopen_continues_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");

        let end1 = {
            let mut writer = WalWriter::open(&path).unwrap();
            writer.append(&entry("a")).unwrap()
        };

        let mut writer = WalWriter::open(&path).unwrap();
        assert_eq!(writer.len(), end1);
        let end2 = writer.append(&entry("b")).unwrap();
        assert_eq!(end2, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("group").join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        writer.append(&entry("a")).unwrap();
        writer.sync().unwrap();
        assert!(path.exists());
    }
}
