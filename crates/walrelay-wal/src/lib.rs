//! WAL file access for walrelay.
//!
//! On-disk format, per entry:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized WalEntry)]
//! ```
//!
//! The byte offset immediately after a payload is a *frame boundary*;
//! resume positions always land on one.
//!
//! - [`WalWriter`] — append-only writer for one file (test and demo write
//!   path; the production writer lives outside this repository)
//! - [`EntryReader`] / [`ReaderFactory`] — the cursor contract the reader
//!   core consumes
//! - [`WalCursor`] — file-backed cursor that distinguishes a clean EOF
//!   from a partial tail frame, so callers can tell "file complete" from
//!   "writer still flushing"

pub mod error;
pub mod frame;
pub mod reader;
pub mod writer;

pub use error::{WalError, WalResult};
pub use frame::{encode_frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use reader::{CursorFactory, EntryReader, ReadOutcome, ReaderFactory, WalCursor};
pub use writer::WalWriter;
