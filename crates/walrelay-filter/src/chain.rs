use walrelay_types::WalEntry;

/// Decides whether (and in what form) an entry is replicated.
///
/// Returning `None` drops the entry. Returning a rewritten entry (e.g.
/// with some cells removed) is allowed; the rewritten entry is what the
/// rest of the pipeline sees.
pub trait EntryFilter: Send + Sync {
    fn filter(&self, entry: WalEntry) -> Option<WalEntry>;
}

/// Left-to-right composition of filters. The first filter returning
/// `None` short-circuits the rest.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn EntryFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the end of the chain (builder-style).
    pub fn with(mut self, filter: impl EntryFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn EntryFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl EntryFilter for FilterChain {
    fn filter(&self, entry: WalEntry) -> Option<WalEntry> {
        self.filters
            .iter()
            .try_fold(entry, |entry, f| f.filter(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrelay_types::{Cell, TableName};

    struct DropAll;
    impl EntryFilter for DropAll {
        fn filter(&self, _entry: WalEntry) -> Option<WalEntry> {
            None
        }
    }

    struct Rename(TableName);
    impl EntryFilter for Rename {
        fn filter(&self, mut entry: WalEntry) -> Option<WalEntry> {
            entry.table = self.0.clone();
            Some(entry)
        }
    }

    fn entry() -> WalEntry {
        WalEntry::new("t", 0).with_cell(Cell::new(
            b"r".to_vec(),
            b"f".to_vec(),
            b"q".to_vec(),
            b"v".to_vec(),
        ))
    }

    #[test]
    fn empty_chain_passes_through() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.filter(entry()), Some(entry()));
    }

    #[test]
    fn chain_applies_left_to_right() {
        let chain = FilterChain::new()
            .with(Rename(TableName::new("a")))
            .with(Rename(TableName::new("b")));
        let out = chain.filter(entry()).unwrap();
        assert_eq!(out.table, TableName::new("b"));
    }

    #[test]
    fn none_short_circuits() {
        let chain = FilterChain::new().with(DropAll).with(Rename(TableName::new("x")));
        assert_eq!(chain.len(), 2);
        assert!(chain.filter(entry()).is_none());
    }
}
