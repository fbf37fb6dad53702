//! Entry filters for walrelay.
//!
//! A filter inspects one [`WalEntry`](walrelay_types::WalEntry) and
//! either passes it through (possibly rewritten, e.g. with cells
//! removed) or drops it entirely. Filters compose left-to-right in a
//! [`FilterChain`]; the first `None` short-circuits.
//!
//! Filters are stateless with respect to cross-entry ordering; they may
//! hold immutable configuration only.

pub mod chain;
pub mod family;
pub mod scope;
pub mod table;

pub use chain::{EntryFilter, FilterChain};
pub use family::FamilyFilter;
pub use scope::ScopeFilter;
pub use table::TableFilter;
