//! Tile coordinates
//!
//! A tile is addressed by `(z, x, y)` with `0 <= x, y < 2^z`. Every tile also
//! has a dense `u32` id: tiles are numbered zoom by zoom, and row-major
//! (`y` then `x`) within a zoom:
//!
//! ```text
//! id = (4^z - 1) / 3  +  y * 2^z  +  x
//! ```
//!
//! The id is what the sorter keys on, so the `Ord` of [`TileCoord`]
//! is defined as the order of ids. Zoom 15 is the deepest level whose ids
//! still fit in a `u32`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Deepest supported zoom level
pub const MAX_ZOOM: u8 = 15;

/// Immutable tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    z: u8,
    x: u32,
    y: u32,
}

/// Id of the first tile at `z`.
#[inline]
fn zoom_start(z: u8) -> u32 {
    (((1u64 << (2 * z as u64)) - 1) / 3) as u32
}

impl TileCoord {
    /// Create a tile coordinate, validating zoom and range.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        if z > MAX_ZOOM {
            return Err(Error::ZoomOutOfRange(z));
        }
        let dim = 1u32 << z;
        if x >= dim || y >= dim {
            return Err(Error::InvalidTile { z, x, y });
        }
        Ok(TileCoord { z, x, y })
    }

    /// Zoom level
    pub fn z(&self) -> u8 {
        self.z
    }

    /// Column
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Row
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Dense tile id, monotonic with the tile order.
    #[inline]
    pub fn encode(&self) -> u32 {
        zoom_start(self.z) + (self.y << self.z) + self.x
    }

    /// Inverse of [`TileCoord::encode`].
    pub fn decode(id: u32) -> Result<Self> {
        let mut z = 0u8;
        while z < MAX_ZOOM && zoom_start(z + 1) <= id {
            z += 1;
        }
        let offset = id - zoom_start(z);
        let dim = 1u32 << z;
        if offset >= dim * dim {
            return Err(Error::InvalidTileId(id));
        }
        Ok(TileCoord {
            z,
            x: offset % dim,
            y: offset / dim,
        })
    }
}

impl Ord for TileCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encode().cmp(&other.encode())
    }
}

impl PartialOrd for TileCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
