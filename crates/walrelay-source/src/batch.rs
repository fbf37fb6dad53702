use tracing::warn;

use walrelay_types::{Position, WalEntry};

use crate::config::SourceConfig;

/// A ship-ready unit of replication work.
///
/// Holds the filtered entries read since the previous batch, their
/// aggregate statistics, and the exact stream position after the last
/// byte this batch accounts for. Mutated only by the owning reader;
/// once handed to the ready-queue it is not touched again.
#[derive(Debug)]
pub struct Batch {
    entries: Vec<WalEntry>,
    end_position: Position,
    more_entries: bool,
    heap_size: u64,
    quota_size: u64,
    row_keys: u64,
    bulk_load_files: u64,
    last_write_time_ms: u64,
}

impl Batch {
    fn new(start: Position) -> Self {
        Self {
            entries: Vec::new(),
            end_position: start,
            more_entries: true,
            heap_size: 0,
            quota_size: 0,
            row_keys: 0,
            bulk_load_files: 0,
            last_write_time_ms: 0,
        }
    }

    pub fn entries(&self) -> &[WalEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<WalEntry> {
        self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Edit bytes plus referenced bulk-load bytes.
    pub fn heap_size(&self) -> u64 {
        self.heap_size
    }

    /// Bytes accounted against the process quota: edit bytes only, since
    /// bulk-load files are never buffered by the reader.
    pub fn quota_size(&self) -> u64 {
        self.quota_size
    }

    /// Distinct row keys across the batch, counting runs of equal
    /// consecutive rows within each entry once.
    pub fn row_keys(&self) -> u64 {
        self.row_keys
    }

    /// Bulk-load file references carried by the batch.
    pub fn bulk_load_files(&self) -> u64 {
        self.bulk_load_files
    }

    /// Position after the last byte this batch covers. Resuming a reader
    /// here yields exactly the entries not yet part of any batch.
    pub fn end_position(&self) -> &Position {
        &self.end_position
    }

    /// `false` only on the final batch of a fully drained recovered
    /// queue; the group reader stops after shipping such a batch.
    pub fn more_entries(&self) -> bool {
        self.more_entries
    }

    /// Write time of the newest entry, or 0 for an empty batch.
    pub fn last_write_time_ms(&self) -> u64 {
        self.last_write_time_ms
    }

    pub(crate) fn set_end_position(&mut self, position: Position) {
        self.end_position = position;
    }

    pub(crate) fn set_more_entries(&mut self, more: bool) {
        self.more_entries = more;
    }
}

/// Accumulates filtered entries into [`Batch`]es bounded by entry count
/// and heap size. The process-wide quota is the caller's third close
/// condition.
#[derive(Clone, Debug)]
pub struct BatchAssembler {
    size_capacity: u64,
    count_capacity: usize,
}

impl BatchAssembler {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            size_capacity: config.batch_size_capacity,
            count_capacity: config.batch_count_capacity,
        }
    }

    /// Open a batch starting at the given stream position.
    pub fn start(&self, position: Position) -> Batch {
        Batch::new(position)
    }

    /// Add one filtered entry, updating the batch statistics. Returns
    /// the entry's quota-accountable size.
    pub fn push(&self, batch: &mut Batch, entry: WalEntry) -> u64 {
        let edit_bytes = entry.heap_size();
        let bulk_bytes = entry.bulk_load_bytes();

        batch.row_keys += count_row_keys(&entry);
        batch.bulk_load_files += count_bulk_load_files(&entry);
        batch.heap_size += edit_bytes + bulk_bytes;
        batch.quota_size += edit_bytes;
        batch.last_write_time_ms = entry.write_time_ms;
        batch.entries.push(entry);

        edit_bytes
    }

    /// Returns `true` once either per-batch cap is reached.
    pub fn is_full(&self, batch: &Batch) -> bool {
        batch.heap_size >= self.size_capacity || batch.entries.len() >= self.count_capacity
    }
}

/// Distinct row keys in one entry, comparing successive cells.
fn count_row_keys(entry: &WalEntry) -> u64 {
    let mut count = 0;
    let mut previous: Option<&[u8]> = None;
    for cell in &entry.cells {
        if previous != Some(cell.row.as_ref()) {
            count += 1;
            previous = Some(cell.row.as_ref());
        }
    }
    count
}

/// Referenced bulk-load files in one entry. Malformed descriptors are
/// logged and skipped rather than failing the pipeline.
fn count_bulk_load_files(entry: &WalEntry) -> u64 {
    let mut count = 0;
    for decoded in entry.bulk_load_descriptors() {
        match decoded {
            Ok(descriptor) => count += descriptor.files.len() as u64,
            Err(e) => {
                warn!(table = %entry.table, error = %e, "skipping malformed bulk-load descriptor");
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrelay_types::{
        BulkLoadDescriptor, BulkLoadFile, Cell, BULK_LOAD_QUALIFIER, METADATA_FAMILY,
    };

    fn assembler() -> BatchAssembler {
        BatchAssembler::new(&SourceConfig::default())
    }

    fn cell(row: &[u8]) -> Cell {
        Cell::new(row.to_vec(), b"fam".to_vec(), b"q".to_vec(), b"v".to_vec())
    }

    #[test]
    fn row_keys_count_runs_of_equal_rows() {
        let entry = WalEntry::new("t", 1)
            .with_cell(cell(b"a"))
            .with_cell(cell(b"a"))
            .with_cell(cell(b"b"))
            .with_cell(cell(b"a"));

        let assembler = assembler();
        let mut batch = assembler.start(Position::new("x.wal", 0));
        assembler.push(&mut batch, entry);
        // a, a | b | a  -> three runs
        assert_eq!(batch.row_keys(), 3);
    }

    #[test]
    fn quota_size_excludes_bulk_load_bytes() {
        let descriptor = BulkLoadDescriptor {
            family: "fam".into(),
            files: vec![
                BulkLoadFile {
                    path: "h1".into(),
                    size_bytes: 1_000,
                },
                BulkLoadFile {
                    path: "h2".into(),
                    size_bytes: 2_000,
                },
            ],
        };
        let marker = Cell::new(
            b"r".to_vec(),
            METADATA_FAMILY.to_vec(),
            BULK_LOAD_QUALIFIER.to_vec(),
            descriptor.encode().unwrap(),
        );
        let entry = WalEntry::new("t", 1).with_cell(marker);
        let edit_bytes = entry.heap_size();

        let assembler = assembler();
        let mut batch = assembler.start(Position::new("x.wal", 0));
        let accounted = assembler.push(&mut batch, entry);

        assert_eq!(accounted, edit_bytes);
        assert_eq!(batch.quota_size(), edit_bytes);
        assert_eq!(batch.heap_size(), edit_bytes + 3_000);
        assert_eq!(batch.bulk_load_files(), 2);
    }

    #[test]
    fn count_cap_closes_batch() {
        let config = SourceConfig {
            batch_count_capacity: 2,
            ..SourceConfig::default()
        };
        let assembler = BatchAssembler::new(&config);
        let mut batch = assembler.start(Position::new("x.wal", 0));

        assembler.push(&mut batch, WalEntry::new("t", 1).with_cell(cell(b"a")));
        assert!(!assembler.is_full(&batch));
        assembler.push(&mut batch, WalEntry::new("t", 2).with_cell(cell(b"b")));
        assert!(assembler.is_full(&batch));
        assert_eq!(batch.entry_count(), 2);
        assert_eq!(batch.last_write_time_ms(), 2);
    }

    #[test]
    fn size_cap_closes_batch() {
        let config = SourceConfig {
            batch_size_capacity: 1,
            ..SourceConfig::default()
        };
        let assembler = BatchAssembler::new(&config);
        let mut batch = assembler.start(Position::new("x.wal", 0));
        assembler.push(&mut batch, WalEntry::new("t", 1).with_cell(cell(b"a")));
        assert!(assembler.is_full(&batch));
    }

    #[test]
    fn fresh_batch_defaults() {
        let batch = assembler().start(Position::new("x.wal", 7));
        assert!(batch.is_empty());
        assert!(batch.more_entries());
        assert_eq!(batch.end_position(), &Position::new("x.wal", 7));
        assert_eq!(batch.quota_size(), 0);
    }
}
