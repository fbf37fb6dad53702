use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Reserved family for metadata cells (bulk-load markers and the like).
/// Cells in this family describe the entry rather than carry user data.
pub const METADATA_FAMILY: &[u8] = b"_walmeta_";

/// Qualifier of a metadata cell whose value is a bincode-encoded
/// [`BulkLoadDescriptor`].
pub const BULK_LOAD_QUALIFIER: &[u8] = b"bulk_load";

/// Fixed per-cell bookkeeping overhead added to the payload lengths
/// when estimating heap usage.
const CELL_OVERHEAD: u64 = 48;

/// Identifier of the table an entry belongs to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Replication scope of a column family.
///
/// Families scoped `Local` are not shipped to remote clusters; `Global`
/// families are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationScope {
    Local,
    Global,
}

impl ReplicationScope {
    /// Returns `true` if cells in this scope are shipped to peers.
    pub fn is_replicated(self) -> bool {
        matches!(self, Self::Global)
    }
}

/// A single mutation inside a WAL entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: Bytes,
    pub family: Bytes,
    pub qualifier: Bytes,
    pub value: Bytes,
}

impl Cell {
    pub fn new(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }

    /// Estimated in-memory footprint of this cell.
    pub fn heap_size(&self) -> u64 {
        self.row.len() as u64
            + self.family.len() as u64
            + self.qualifier.len() as u64
            + self.value.len() as u64
            + CELL_OVERHEAD
    }

    /// Returns `true` if this cell lives in the reserved metadata family.
    pub fn is_metadata(&self) -> bool {
        self.family.as_ref() == METADATA_FAMILY
    }

    /// Returns `true` if this cell is a bulk-load marker.
    pub fn is_bulk_load_marker(&self) -> bool {
        self.is_metadata() && self.qualifier.as_ref() == BULK_LOAD_QUALIFIER
    }
}

/// One externally loaded data file referenced from the WAL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLoadFile {
    /// Store-relative path of the loaded file.
    pub path: String,
    /// Size of the file in bytes.
    pub size_bytes: u64,
}

/// Payload of a bulk-load marker cell.
///
/// A bulk-load WAL record does not inline the loaded bytes; it references
/// the loaded files so replication can ship them alongside the edits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLoadDescriptor {
    /// Column family the files were loaded into.
    pub family: String,
    /// The loaded files.
    pub files: Vec<BulkLoadFile>,
}

impl BulkLoadDescriptor {
    pub fn encode(&self) -> Result<Bytes, TypeError> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| TypeError::DescriptorEncoding(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, TypeError> {
        bincode::deserialize(payload).map_err(|e| TypeError::MalformedDescriptor(e.to_string()))
    }

    /// Total bytes of all referenced files.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// One replicable WAL record.
///
/// The reader core treats the entry as opaque apart from the fields here:
/// the originating table, the wall-clock write time, the per-family
/// replication scopes, and the cells (whose sizes drive batching).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    pub table: TableName,
    /// Wall-clock milliseconds since the UNIX epoch at origin.
    pub write_time_ms: u64,
    /// Replication scope per column family. Families absent from the map
    /// default to `Local`.
    pub scopes: BTreeMap<Bytes, ReplicationScope>,
    pub cells: Vec<Cell>,
}

impl WalEntry {
    pub fn new(table: impl Into<TableName>, write_time_ms: u64) -> Self {
        Self {
            table: table.into(),
            write_time_ms,
            scopes: BTreeMap::new(),
            cells: Vec::new(),
        }
    }

    /// Set the replication scope for a family (builder-style).
    pub fn with_scope(mut self, family: impl Into<Bytes>, scope: ReplicationScope) -> Self {
        self.scopes.insert(family.into(), scope);
        self
    }

    /// Append a cell (builder-style).
    pub fn with_cell(mut self, cell: Cell) -> Self {
        self.cells.push(cell);
        self
    }

    /// Scope of the given family, defaulting to `Local` when unmapped.
    pub fn scope_of(&self, family: &[u8]) -> ReplicationScope {
        self.scopes
            .get(family)
            .copied()
            .unwrap_or(ReplicationScope::Local)
    }

    /// Returns `true` if the entry carries no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Estimated in-memory footprint of the entry's cells.
    ///
    /// Bulk-load file bytes are *not* included; see
    /// [`WalEntry::bulk_load_bytes`].
    pub fn heap_size(&self) -> u64 {
        self.cells.iter().map(Cell::heap_size).sum()
    }

    /// Decoded bulk-load descriptors carried by this entry.
    ///
    /// Malformed descriptor payloads are reported as errors alongside the
    /// well-formed ones so callers can decide whether to skip or abort.
    pub fn bulk_load_descriptors(&self) -> Vec<Result<BulkLoadDescriptor, TypeError>> {
        self.cells
            .iter()
            .filter(|c| c.is_bulk_load_marker())
            .map(|c| BulkLoadDescriptor::decode(&c.value))
            .collect()
    }

    /// Total bytes of all well-formed bulk-load file references.
    pub fn bulk_load_bytes(&self) -> u64 {
        self.bulk_load_descriptors()
            .into_iter()
            .filter_map(Result::ok)
            .map(|d| d.total_bytes())
            .sum()
    }
}
