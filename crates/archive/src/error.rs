//! Archive error types

use std::io;
use thiserror::Error;

/// Result type alias for archive operations
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Errors that can occur while writing or reading a stream archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// IO error on a shard destination
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Operation not allowed in the shard's current state
    #[error("Illegal archive state on shard {shard}: cannot {operation} while {state}")]
    State {
        /// Shard index
        shard: usize,
        /// Rejected operation
        operation: &'static str,
        /// State the shard was in
        state: &'static str,
    },

    /// Malformed record while reading an archive
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unparseable format option
    #[error("Invalid option {name}: {value}")]
    InvalidOption {
        /// Option name
        name: &'static str,
        /// Rejected value
        value: String,
    },
}

impl ArchiveError {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        ArchiveError::Decode(msg.into())
    }
}

impl From<prost::DecodeError> for ArchiveError {
    fn from(e: prost::DecodeError) -> Self {
        ArchiveError::Decode(e.to_string())
    }
}
