use std::collections::HashSet;

use walrelay_types::{TableName, WalEntry};

use crate::chain::EntryFilter;

/// Keeps only entries for an allow-listed set of tables.
#[derive(Clone, Debug, Default)]
pub struct TableFilter {
    tables: HashSet<TableName>,
}

impl TableFilter {
    pub fn new(tables: impl IntoIterator<Item = TableName>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }
}

impl EntryFilter for TableFilter {
    fn filter(&self, entry: WalEntry) -> Option<WalEntry> {
        if self.tables.contains(&entry.table) {
            Some(entry)
        } else {
            None
        }
    }
}
