//! Sortable features and rendered tiles
//!
//! ## Sort Key Layout
//!
//! ```text
//! ┌───────────────────────────┬───────────────────────────┐
//! │ tile id (u32, high bits)  │ secondary (u32, low bits) │
//! └───────────────────────────┴───────────────────────────┘
//! ```
//!
//! The tile id dominates, so sorting by the key groups features by tile in
//! tile order. The secondary half is chosen by whoever renders features
//! (layer id, z-order, ...) and only orders features inside a tile.

use crate::error::Result;
use crate::metadata::VectorLayer;
use crate::tile::TileCoord;

/// A feature as seen by the external sorter: a 64-bit key and opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedFeature {
    /// `tile_id << 32 | secondary`
    pub sort_key: u64,
    /// Serialized feature, never interpreted by the sorter
    pub payload: Vec<u8>,
}

impl EncodedFeature {
    /// Create a feature for `coord` with an in-tile ordering value.
    pub fn new(coord: TileCoord, secondary: u32, payload: Vec<u8>) -> Self {
        EncodedFeature {
            sort_key: Self::pack_key(coord, secondary),
            payload,
        }
    }

    /// Create a feature from an already packed key.
    pub fn from_raw(sort_key: u64, payload: Vec<u8>) -> Self {
        EncodedFeature { sort_key, payload }
    }

    /// Pack a tile and secondary value into a sort key.
    #[inline]
    pub fn pack_key(coord: TileCoord, secondary: u32) -> u64 {
        ((coord.encode() as u64) << 32) | secondary as u64
    }

    /// Tile id half of the key.
    #[inline]
    pub fn tile_id(&self) -> u32 {
        (self.sort_key >> 32) as u32
    }

    /// Secondary half of the key.
    #[inline]
    pub fn secondary(&self) -> u32 {
        self.sort_key as u32
    }

    /// Decode the tile this feature belongs to.
    pub fn coord(&self) -> Result<TileCoord> {
        TileCoord::decode(self.tile_id())
    }
}

/// One rendered tile, the unit consumed by archive writers.
///
/// `tile_data` of `None` is a valid, explicitly empty tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileEncodingResult {
    /// Tile address
    pub coord: TileCoord,
    /// Encoded (typically compressed) tile payload
    pub tile_data: Option<Vec<u8>>,
    /// Per-layer field types seen in this tile
    pub layer_stats: Option<Vec<VectorLayer>>,
}

impl TileEncodingResult {
    /// Create a result without layer stats.
    pub fn new(coord: TileCoord, tile_data: Option<Vec<u8>>) -> Self {
        TileEncodingResult {
            coord,
            tile_data,
            layer_stats: None,
        }
    }

    /// Attach layer stats (builder pattern).
    pub fn with_layer_stats(mut self, layers: Vec<VectorLayer>) -> Self {
        self.layer_stats = Some(layers);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_packs_tile_then_secondary() {
        let coord = TileCoord::new(2, 1, 3).unwrap();
        let feature = EncodedFeature::new(coord, 7, vec![1]);
        assert_eq!(feature.tile_id(), coord.encode());
        assert_eq!(feature.secondary(), 7);
        assert_eq!(feature.coord().unwrap(), coord);
    }

    #[test]
    fn test_tile_dominates_secondary() {
        let a = EncodedFeature::new(TileCoord::new(1, 0, 0).unwrap(), u32::MAX, vec![]);
        let b = EncodedFeature::new(TileCoord::new(1, 1, 0).unwrap(), 0, vec![]);
        assert!(a.sort_key < b.sort_key);
    }

    #[test]
    fn test_result_builder() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let result = TileEncodingResult::new(coord, None).with_layer_stats(vec![]);
        assert_eq!(result.tile_data, None);
        assert_eq!(result.layer_stats, Some(vec![]));
    }
}
