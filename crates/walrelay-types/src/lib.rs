//! Foundation types for walrelay.
//!
//! This crate provides the data model shared by every other walrelay
//! crate: the WAL entry and its cells, replication scopes, bulk-load
//! descriptors, and the `(path, offset)` resume position.
//!
//! # Key Types
//!
//! - [`WalEntry`] — One replicable WAL record: table, write time, scopes, cells
//! - [`Cell`] — A single mutation inside an entry
//! - [`TableName`] — Table identifier
//! - [`ReplicationScope`] — Per-family replication scope (`Local` or `Global`)
//! - [`BulkLoadDescriptor`] — Reference to externally loaded data files
//! - [`Position`] — Durable resume point: a WAL path and a frame-boundary offset

pub mod entry;
pub mod error;
pub mod position;

pub use entry::{
    BulkLoadDescriptor, BulkLoadFile, Cell, ReplicationScope, TableName, WalEntry,
    BULK_LOAD_QUALIFIER, METADATA_FAMILY,
};
pub use error::TypeError;
pub use position::Position;
