//! Error types for pipdb.

use thiserror::Error;

/// Errors surfaced by the spatial database.
#[derive(Debug, Error)]
pub enum PipError {
    /// Bad connection URI, unknown backend scheme, missing or invalid parameter
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failure that is not a plain I/O error
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted ring set is empty or unparsable; the index is corrupt
    #[error("malformed geometry for {path}: {reason}")]
    MalformedGeometry { path: String, reason: String },

    #[error("record not found: {0}")]
    NotFound(String),

    /// A persisted geometry body could not be decoded
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid append-only file format")]
    InvalidFormat,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is closed")]
    DatabaseClosed,
}

impl PipError {
    /// Whether the error means the persisted index itself is broken.
    pub fn is_index_integrity(&self) -> bool {
        matches!(self, PipError::MalformedGeometry { .. })
    }
}

impl From<serde_json::Error> for PipError {
    fn from(err: serde_json::Error) -> Self {
        PipError::Serialization(err.to_string())
    }
}

#[cfg(feature = "aof")]
impl From<bincode::Error> for PipError {
    fn from(err: bincode::Error) -> Self {
        PipError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipError>;
