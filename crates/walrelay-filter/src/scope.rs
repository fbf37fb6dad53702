use walrelay_types::WalEntry;

use crate::chain::EntryFilter;

/// Drops cells whose column family is not scoped for replication.
///
/// Cells in the reserved metadata family always pass (bulk-load markers
/// must reach the peer). An entry emptied by cell removal is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScopeFilter;

impl EntryFilter for ScopeFilter {
    fn filter(&self, mut entry: WalEntry) -> Option<WalEntry> {
        let scopes = entry.scopes.clone();
        entry.cells.retain(|cell| {
            cell.is_metadata() || scopes.get(&cell.family).is_some_and(|s| s.is_replicated())
        });
        if entry.cells.is_empty() {
            None
        } else {
            Some(entry)
        }
    }
}
