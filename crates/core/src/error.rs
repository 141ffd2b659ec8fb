//! Error types for tilepress core
//!
//! Errors raised while constructing or decoding the shared value types.
//! Storage, archive and pipeline layers define their own error enums and
//! wrap this one.

use crate::tile::MAX_ZOOM;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for core value construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Column or row outside `0..2^zoom`
    #[error("Invalid tile coordinate {z}/{x}/{y}")]
    InvalidTile {
        /// Zoom level
        z: u8,
        /// Column
        x: u32,
        /// Row
        y: u32,
    },

    /// Zoom above the deepest supported level
    #[error("Zoom {0} exceeds maximum zoom {max}", max = MAX_ZOOM)]
    ZoomOutOfRange(u8),

    /// A tile id that does not decode to any tile
    #[error("Tile id {0} does not decode to a tile")]
    InvalidTileId(u32),

    /// Archive metadata failed validation
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}
