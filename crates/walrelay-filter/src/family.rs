use std::collections::HashSet;

use bytes::Bytes;
use walrelay_types::WalEntry;

use crate::chain::EntryFilter;

/// Keeps only cells in an allow-listed set of column families.
///
/// Cells in the reserved metadata family always pass. An entry emptied
/// by cell removal is dropped.
#[derive(Clone, Debug, Default)]
pub struct FamilyFilter {
    families: HashSet<Bytes>,
}

impl FamilyFilter {
    pub fn new(families: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            families: families.into_iter().collect(),
        }
    }
}

impl EntryFilter for FamilyFilter {
    fn filter(&self, mut entry: WalEntry) -> Option<WalEntry> {
        entry
            .cells
            .retain(|cell| cell.is_metadata() || self.families.contains(&cell.family));
        if entry.cells.is_empty() {
            None
        } else {
            Some(entry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrelay_types::Cell;

    fn cell(family: &[u8]) -> Cell {
        Cell::new(b"r".to_vec(), family.to_vec(), b"q".to_vec(), b"v".to_vec())
    }

    #[test]
    fn rewrites_entry_to_kept_families() {
        let filter = FamilyFilter::new([Bytes::from_static(b"fam")]);
        let entry = WalEntry::new("t", 0)
            .with_cell(cell(b"fam"))
            .with_cell(cell(b"other"))
            .with_cell(cell(b"fam"));

        let out = filter.filter(entry).unwrap();
        assert_eq!(out.cells.len(), 2);
        assert!(out.cells.iter().all(|c| c.family.as_ref() == b"fam"));
    }

    #[test]
    fn drops_fully_foreign_entries() {
        let filter = FamilyFilter::new([Bytes::from_static(b"fam")]);
        let entry = WalEntry::new("t", 0).with_cell(cell(b"other"));
        assert!(filter.filter(entry).is_none());
    }
}
