use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::trace;

use walrelay_types::WalEntry;

use crate::error::{WalError, WalResult};
use crate::frame::{parse_header, FRAME_HEADER_LEN, MAX_FRAME_LEN};

/// Outcome of one cursor step.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete entry was decoded; the cursor advanced past it.
    Entry(WalEntry),
    /// Zero bytes available at a frame boundary: the file ends cleanly
    /// here, though a tailed file may still grow.
    Eof,
    /// A partial frame at the tail. The writer may still be flushing;
    /// the cursor did not advance and a later call retries from the
    /// same boundary.
    Truncated,
}

/// Stateful cursor over one WAL file.
///
/// Yields decoded entries and reports the frame boundary after each one.
/// Implementations must be reopenable at a reported position via a
/// [`ReaderFactory`] with identical results.
pub trait EntryReader: Send {
    /// Attempt to decode the entry at the cursor.
    fn read_next(&mut self) -> WalResult<ReadOutcome>;

    /// Frame boundary after the last decoded entry (or the opening
    /// offset if none has been decoded yet).
    fn position(&self) -> u64;

    /// The file this cursor reads.
    fn path(&self) -> &Path;
}

/// Opens [`EntryReader`]s. Injected into the reader core so tests and
/// alternative formats can substitute their own cursors.
pub trait ReaderFactory: Send + Sync {
    fn open(&self, path: &Path, offset: u64) -> WalResult<Box<dyn EntryReader>>;
}

/// [`ReaderFactory`] producing [`WalCursor`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct CursorFactory;

impl ReaderFactory for CursorFactory {
    fn open(&self, path: &Path, offset: u64) -> WalResult<Box<dyn EntryReader>> {
        Ok(Box::new(WalCursor::open(path, offset)?))
    }
}

/// File-backed [`EntryReader`].
///
/// The underlying file handle is opened eagerly (so a missing path
/// surfaces as a retryable error at open time) and re-seeked after any
/// short read, keeping the cursor on a frame boundary at all times.
#[derive(Debug)]
pub struct WalCursor {
    path: PathBuf,
    offset: u64,
    file: BufReader<File>,
}

impl WalCursor {
    /// Open a cursor at the given frame boundary.
    pub fn open(path: &Path, offset: u64) -> WalResult<Self> {
        let file = File::open(path)?;
        let mut file = BufReader::new(file);
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            path: path.to_path_buf(),
            offset,
            file,
        })
    }

    /// Seek back to the last frame boundary after a short read, dropping
    /// any buffered bytes so appended data is visible on the next call.
    fn rewind(&mut self) -> WalResult<()> {
        self.file.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> WalError {
        WalError::Corrupt {
            path: self.path.clone(),
            offset: self.offset,
            reason: reason.into(),
        }
    }
}

impl EntryReader for WalCursor {
    fn read_next(&mut self) -> WalResult<ReadOutcome> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        match read_full(&mut self.file, &mut header)? {
            0 => {
                // Stay on the boundary; the file may grow.
                self.rewind()?;
                return Ok(ReadOutcome::Eof);
            }
            n if n < FRAME_HEADER_LEN => {
                trace!(path = %self.path.display(), offset = self.offset, got = n, "partial frame header");
                self.rewind()?;
                return Ok(ReadOutcome::Truncated);
            }
            _ => {}
        }

        let (length, expected_crc) = parse_header(&header);
        if length == 0 || length > MAX_FRAME_LEN {
            return Err(self.corrupt(format!("invalid frame length {length}")));
        }

        let mut payload = vec![0u8; length as usize];
        let got = read_full(&mut self.file, &mut payload)?;
        if got < payload.len() {
            trace!(path = %self.path.display(), offset = self.offset, got, want = length, "partial frame payload");
            self.rewind()?;
            return Ok(ReadOutcome::Truncated);
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(self.corrupt(format!(
                "crc mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
            )));
        }

        let entry: WalEntry = bincode::deserialize(&payload)
            .map_err(|e| self.corrupt(format!("undecodable payload: {e}")))?;

        self.offset += (FRAME_HEADER_LEN + payload.len()) as u64;
        Ok(ReadOutcome::Entry(entry))
    }

    fn position(&self) -> u64 {
        self.offset
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Read until `buf` is full or EOF, returning the byte count.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WalWriter;
    use std::fs::OpenOptions;
    use walrelay_types::Cell;

    fn entry(row: &str) -> WalEntry {
        WalEntry::new("t", 1_000).with_cell(Cell::new(
            row.as_bytes().to_vec(),
            b"fam".to_vec(),
            b"q".to_vec(),
            b"v".to_vec(),
        ))
    }

    fn expect_entry(cursor: &mut WalCursor) -> WalEntry {
        match cursor.read_next().unwrap() {
            ReadOutcome::Entry(e) => e,
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[test]
    fn reads_back_in_order_with_boundary_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        let ends: Vec<u64> = ["a", "b", "c"]
            .iter()
            .map(|r| writer.append(&entry(r)).unwrap())
            .collect();

        let mut cursor = WalCursor::open(&path, 0).unwrap();
        for (row, end) in ["a", "b", "c"].iter().zip(&ends) {
            let got = expect_entry(&mut cursor);
            assert_eq!(got.cells[0].row.as_ref(), row.as_bytes());
            assert_eq!(cursor.position(), *end);
        }
        assert!(matches!(cursor.read_next().unwrap(), ReadOutcome::Eof));
    }

    #[test]
    fn sees_appends_after_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        writer.append(&entry("a")).unwrap();

        let mut cursor = WalCursor::open(&path, 0).unwrap();
        expect_entry(&mut cursor);
        assert!(matches!(cursor.read_next().unwrap(), ReadOutcome::Eof));

        // The writer keeps going; the same cursor must pick it up.
        writer.append(&entry("b")).unwrap();
        let got = expect_entry(&mut cursor);
        assert_eq!(got.cells[0].row.as_ref(), b"b");
    }

    #[test]
    fn reopens_at_reported_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        let end1 = writer.append(&entry("a")).unwrap();
        writer.append(&entry("b")).unwrap();

        let mut cursor = WalCursor::open(&path, end1).unwrap();
        let got = expect_entry(&mut cursor);
        assert_eq!(got.cells[0].row.as_ref(), b"b");
    }

    #[test]
    fn partial_tail_is_truncated_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        let end1 = writer.append(&entry("a")).unwrap();
        let end2 = writer.append(&entry("b")).unwrap();
        drop(writer);

        let full = std::fs::read(&path).unwrap();

        // Every strictly-partial suffix of the final frame must read as
        // Truncated with the cursor parked at the first boundary.
        for cut in (end1 + 1)..end2 {
            std::fs::write(&path, &full[..cut as usize]).unwrap();
            let mut cursor = WalCursor::open(&path, 0).unwrap();
            expect_entry(&mut cursor);
            assert!(
                matches!(cursor.read_next().unwrap(), ReadOutcome::Truncated),
                "cut at {cut} should be truncated"
            );
            assert_eq!(cursor.position(), end1);
        }

        // Once the writer finishes the frame, the same boundary yields it.
        std::fs::write(&path, &full).unwrap();
        let mut cursor = WalCursor::open(&path, end1).unwrap();
        let got = expect_entry(&mut cursor);
        assert_eq!(got.cells[0].row.as_ref(), b"b");
    }

    #[test]
    fn truncated_tail_resumes_on_same_cursor_after_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        let end1 = writer.append(&entry("a")).unwrap();
        let end2 = writer.append(&entry("b")).unwrap();
        drop(writer);

        let full = std::fs::read(&path).unwrap();
        let cut = end1 + (end2 - end1) / 2;
        std::fs::write(&path, &full[..cut as usize]).unwrap();

        let mut cursor = WalCursor::open(&path, 0).unwrap();
        expect_entry(&mut cursor);
        assert!(matches!(cursor.read_next().unwrap(), ReadOutcome::Truncated));

        // Writer completes the frame; the parked cursor decodes it.
        std::fs::write(&path, &full).unwrap();
        let got = expect_entry(&mut cursor);
        assert_eq!(got.cells[0].row.as_ref(), b"b");
        assert_eq!(cursor.position(), end2);
    }

    #[test]
    fn crc_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut writer = WalWriter::open(&path).unwrap();
        writer.append(&entry("a")).unwrap();
        drop(writer);

        // Flip a payload byte.
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(FRAME_HEADER_LEN as u64)).unwrap();
            let mut b = [0u8; 1];
            std::io::Read::read_exact(&mut file, &mut b).unwrap();
            b[0] ^= 0xFF;
            file.seek(SeekFrom::Start(FRAME_HEADER_LEN as u64)).unwrap();
            file.write_all(&b).unwrap();
        }

        let mut cursor = WalCursor::open(&path, 0).unwrap();
        let err = cursor.read_next().unwrap_err();
        assert!(matches!(err, WalError::Corrupt { .. }));
    }

    #[test]
    fn absurd_length_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        let mut frame = Vec::new();
        frame.extend_from_slice(&u32::MAX.to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, &frame).unwrap();

        let mut cursor = WalCursor::open(&path, 0).unwrap();
        assert!(matches!(
            cursor.read_next().unwrap_err(),
            WalError::Corrupt { .. }
        ));
    }

    #[test]
    fn empty_file_is_clean_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        std::fs::write(&path, b"").unwrap();

        let mut cursor = WalCursor::open(&path, 0).unwrap();
        assert!(matches!(cursor.read_next().unwrap(), ReadOutcome::Eof));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn missing_file_is_retryable_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = WalCursor::open(&dir.path().join("nope.wal"), 0).unwrap_err();
        assert!(err.is_not_found());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_entry() -> impl Strategy<Value = WalEntry> {
            (
                "[a-z]{1,8}",
                0u64..u64::MAX / 2,
                proptest::collection::vec(("[a-z]{1,16}", "[a-z]{1,32}"), 1..5),
            )
                .prop_map(|(table, ts, cells)| {
                    let mut entry = WalEntry::new(table.as_str(), ts);
                    for (row, value) in cells {
                        entry = entry.with_cell(Cell::new(
                            row.into_bytes(),
                            b"fam".to_vec(),
                            b"q".to_vec(),
                            value.into_bytes(),
                        ));
                    }
                    entry
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Whatever sequence the writer appends, the cursor yields the
            /// same sequence with strictly increasing frame boundaries.
            #[test]
            fn cursor_preserves_order_and_boundaries(
                entries in proptest::collection::vec(arb_entry(), 1..20)
            ) {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("p.wal");
                let mut writer = WalWriter::open(&path).unwrap();
                let ends: Vec<u64> = entries.iter().map(|e| writer.append(e).unwrap()).collect();

                let mut cursor = WalCursor::open(&path, 0).unwrap();
                let mut last = 0u64;
                for (expected, end) in entries.iter().zip(&ends) {
                    match cursor.read_next().unwrap() {
                        ReadOutcome::Entry(got) => prop_assert_eq!(&got, expected),
                        other => prop_assert!(false, "expected entry, got {:?}", other),
                    }
                    prop_assert_eq!(cursor.position(), *end);
                    prop_assert!(cursor.position() > last);
                    last = cursor.position();
                }
                prop_assert!(matches!(cursor.read_next().unwrap(), ReadOutcome::Eof));
            }
        }
    }
}
