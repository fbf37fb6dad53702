use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Durable resume point for a WAL group reader.
///
/// The offset always lands on a frame boundary, never inside a record,
/// so a reader reopened here decodes the next full entry or a clean EOF.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// The WAL file the offset refers to.
    pub path: PathBuf,
    /// Byte offset of the next frame in that file.
    pub offset: u64,
}

impl Position {
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    /// Start of the given file.
    pub fn start_of(path: impl Into<PathBuf>) -> Self {
        Self::new(path, 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path.display(), self.offset)
    }
}
