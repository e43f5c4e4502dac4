use std::io;
use thiserror::Error;

/// Errors reported by the table engine
#[derive(Error, Debug)]
pub enum ShmMapError {
    /// IO errors from file-backed segments
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Key not present in the table
    #[error("Key not found")]
    KeyNotFound,

    /// Fixed-capacity table has no room for another key
    #[error("Table capacity exceeded")]
    CapacityExceeded,

    /// Mutation of a frozen table, or an attach to a buffer that is not frozen
    #[error("Table is read-only")]
    ReadOnlyViolation,

    /// Import rejected the metadata/bytes pair
    #[error("Inconsistent serialized state: {0}")]
    InconsistentSerializedState(String),

    /// Operation not available for this table mode
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

pub type Result<T> = std::result::Result<T, ShmMapError>;
