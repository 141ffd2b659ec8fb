//! Core types for tilepress
//!
//! This crate defines the foundational types shared by every layer:
//! - TileCoord: (zoom, x, y) tile address with a total order and a stable `u32` id
//! - EncodedFeature: sort key + opaque payload, the unit the external sorter moves
//! - TileEncodingResult: one rendered tile, the unit archive writers consume
//! - ArchiveMetadata: archive-level header/footer record (bounds, zooms, layer schema)
//! - LayerStats: accumulator for per-layer field types seen while rendering
//! - Error: core error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod feature;
pub mod layer_stats;
pub mod metadata;
pub mod tile;

pub use error::{Error, Result};
pub use feature::{EncodedFeature, TileEncodingResult};
pub use layer_stats::LayerStats;
pub use metadata::{ArchiveMetadata, CenterPoint, Envelope, FieldType, VectorLayer};
pub use tile::{TileCoord, MAX_ZOOM};
