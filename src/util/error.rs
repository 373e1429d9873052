//! Error types for the asset encoder.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for encoding operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunk tag is not exactly four bytes
    #[error("Malformed chunk tag {0:?}: expected 4 characters")]
    MalformedTag(String),

    /// Track operation targeted a sequence that does not exist
    #[error("Sequence index {index} out of range (count: {count})")]
    SequenceOutOfRange { index: usize, count: usize },

    /// Track operation needs a sequence but none was created yet
    #[error("Track has no sequences")]
    NoSequences,

    /// Track operation needs the first value of a sequence that is empty
    #[error("Sequence {index} has no first value")]
    NoFirstValue { index: usize },

    /// Mesh buffers violate their shape invariants
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// A size or offset does not fit the 32-bit field that stores it
    #[error("Value {0} does not fit in a 32-bit offset or length field")]
    OffsetOverflow(usize),

    /// Chunk pushed out of the order its container requires
    #[error("Chunk order violation: {0}")]
    ChunkOrder(String),

    /// Container builder operation called in the wrong state
    #[error("Invalid builder state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// File is truncated or corrupted
    #[error("Unexpected end of data at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON input could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create an invalid mesh error.
    pub fn mesh(msg: impl Into<String>) -> Self {
        Self::InvalidMesh(msg.into())
    }

    /// True for data-shape problems that a lenient run may downgrade to a diagnostic.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedTag(_)
                | Self::SequenceOutOfRange { .. }
                | Self::NoSequences
                | Self::NoFirstValue { .. }
        )
    }
}

/// Result type alias for encoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convert a length or position to a 32-bit field value.
#[inline]
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::OffsetOverflow(value))
}
