//! Sort and grouping errors

use crate::config::SorterConfigError;
use std::io;
use thiserror::Error;

/// Result type alias for sort operations
pub type SortResult<T> = std::result::Result<T, SortError>;

/// Errors raised by the feature sorter, the merge and the grouper.
///
/// Every variant is fatal to the run; nothing here is retried.
#[derive(Debug, Error)]
pub enum SortError {
    /// I/O error while spilling or reading a chunk
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Chunk content failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// `add` or `sort` after the sorter was finalized
    #[error("Feature sorter already sorted; no further features may be added")]
    AlreadySorted,

    /// An earlier spill failed and its features were lost
    #[error("Feature sorter failed on an earlier spill; its features are incomplete")]
    Poisoned,

    /// Grouper saw a tile lower than or equal to one it already emitted
    #[error("Features out of order: tile {current} after tile {previous}")]
    OutOfOrder {
        /// Tile id of the previous group
        previous: u32,
        /// Tile id that broke the order
        current: u32,
    },

    /// Payload does not fit a chunk record length field
    #[error("Feature payload of {0} bytes exceeds the chunk record limit")]
    FeatureTooLarge(usize),

    /// Invalid sorter configuration
    #[error("Invalid sorter config: {0}")]
    InvalidConfig(#[from] SorterConfigError),

    /// Invalid tile key
    #[error(transparent)]
    Core(#[from] tilepress_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_out_of_order() {
        let err = SortError::OutOfOrder {
            previous: 9,
            current: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("tile 3 after tile 9"));
    }

    #[test]
    fn test_error_from_io() {
        let err: SortError = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, SortError::Io(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_error_from_core() {
        let err: SortError = tilepress_core::Error::InvalidTileId(7).into();
        assert!(matches!(err, SortError::Core(_)));
    }
}
