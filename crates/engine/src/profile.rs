//! Rendering profile interface

use tilepress_core::{ArchiveMetadata, TileEncodingResult};
use tilepress_storage::TileFeatures;

/// Turns the sorted features of a tile into its archive payload.
///
/// Called from the render pool, so implementations must be thread-safe.
pub trait Profile: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether the source registered as `source` feeds this profile.
    /// Sources it does not care about are skipped.
    fn cares_about_source(&self, _source: &str) -> bool {
        true
    }

    /// Render one tile. A result without `tile_data` is an empty tile.
    fn render_tile(&self, tile: &TileFeatures) -> anyhow::Result<TileEncodingResult>;

    /// Archive metadata known before any tile is written.
    fn metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata::new().with_name(self.name())
    }

    /// Free resources held for ingestion, once every stage has run.
    fn release(&self) {}
}
