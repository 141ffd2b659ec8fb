//! Tile writing phase: group → render → write
//!
//! Tiles are rendered in bounded batches on the render pool and written in
//! tile order, so memory holds at most one batch of tiles.

use crate::error::{PipelineError, PipelineResult};
use crate::profile::Profile;
use rayon::prelude::*;
use std::time::Instant;
use tilepress_archive::ArchiveWriter;
use tilepress_core::{ArchiveMetadata, LayerStats, TileEncodingResult};
use tilepress_storage::{SortResult, TileFeatures};
use tracing::{debug, info};

/// Counters of the tile writing phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileWriteStats {
    /// Tiles handed to the archive writer
    pub tiles_written: u64,
    /// Tiles that rendered to no data and were dropped
    pub tiles_skipped: u64,
    /// Features consumed
    pub features: u64,
}

/// Settings of the tile writing phase.
#[derive(Debug, Clone, Copy)]
pub struct TileWriteOptions {
    /// Tiles rendered per batch
    pub batch_size: usize,
    /// Write tiles without data instead of dropping them
    pub emit_empty_tiles: bool,
}

/// Render every tile group and write the results, framed by the archive's
/// header and footer. Returns the counters and the footer metadata.
pub fn write_tiles<I>(
    groups: I,
    profile: &dyn Profile,
    writer: &mut dyn ArchiveWriter,
    pool: &rayon::ThreadPool,
    options: TileWriteOptions,
) -> PipelineResult<(TileWriteStats, ArchiveMetadata)>
where
    I: Iterator<Item = SortResult<TileFeatures>>,
{
    let start = Instant::now();
    let metadata = profile.metadata();
    writer.initialize(&metadata)?;

    let mut stats = TileWriteStats::default();
    let mut layer_stats = LayerStats::new();
    let mut groups = groups.peekable();
    let mut batch = Vec::with_capacity(options.batch_size);

    while groups.peek().is_some() {
        batch.clear();
        for group in groups.by_ref().take(options.batch_size) {
            batch.push(group?);
        }

        let rendered = pool.install(|| {
            batch
                .par_iter()
                .map(|tile| render(profile, tile))
                .collect::<PipelineResult<Vec<_>>>()
        })?;

        for (tile, result) in batch.iter().zip(rendered) {
            stats.features += tile.len() as u64;
            if let Some(layers) = &result.layer_stats {
                layer_stats.accept(result.coord.z(), layers);
            }
            if result.tile_data.is_none() && !options.emit_empty_tiles {
                stats.tiles_skipped += 1;
                continue;
            }
            writer.write(&result)?;
            stats.tiles_written += 1;
        }

        debug!(
            target: "tilepress::write",
            tiles = stats.tiles_written,
            last = %batch.last().map(|t| t.coord.to_string()).unwrap_or_default(),
            "Batch written"
        );
    }

    let final_metadata = layer_stats.finalize(&metadata);
    writer.finish(&final_metadata)?;

    info!(
        target: "tilepress::write",
        tiles_written = stats.tiles_written,
        tiles_skipped = stats.tiles_skipped,
        features = stats.features,
        shards = writer.shard_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Tiles written"
    );
    Ok((stats, final_metadata))
}

fn render(profile: &dyn Profile, tile: &TileFeatures) -> PipelineResult<TileEncodingResult> {
    let result = profile
        .render_tile(tile)
        .map_err(|source| PipelineError::Render {
            coord: tile.coord,
            source,
        })?;
    if result.coord != tile.coord {
        return Err(PipelineError::Render {
            coord: tile.coord,
            source: anyhow::anyhow!("profile returned tile {} instead", result.coord),
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use std::sync::Arc;
    use tilepress_archive::{CsvEncoder, CsvOptions, StreamArchiveWriter, StreamShard};
    use tilepress_core::{EncodedFeature, FieldType, TileCoord, VectorLayer};
    use tilepress_storage::SortError;

    struct ConcatProfile;

    impl Profile for ConcatProfile {
        fn name(&self) -> &str {
            "concat"
        }

        fn render_tile(&self, tile: &TileFeatures) -> anyhow::Result<TileEncodingResult> {
            let data: Vec<u8> = tile.payloads().flatten().copied().collect();
            let data = if data.is_empty() { None } else { Some(data) };
            Ok(TileEncodingResult::new(tile.coord, data).with_layer_stats(vec![
                VectorLayer::new("features").with_field("n", FieldType::Number),
            ]))
        }
    }

    fn group(z: u8, x: u32, y: u32, payloads: &[&str]) -> SortResult<TileFeatures> {
        let coord = TileCoord::new(z, x, y).unwrap();
        Ok(TileFeatures {
            coord,
            features: payloads
                .iter()
                .map(|p| EncodedFeature::new(coord, 0, p.as_bytes().to_vec()))
                .collect(),
        })
    }

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn memory_writer() -> (StreamArchiveWriter<SharedBuf>, SharedBuf) {
        let buf = SharedBuf::default();
        let encoder = Arc::new(CsvEncoder::new(CsvOptions::csv()));
        let shard = StreamShard::from_writer(0, encoder, buf.clone());
        (StreamArchiveWriter::from_shards(vec![shard]).unwrap(), buf)
    }

    #[test]
    fn test_writes_in_order_and_skips_empty() {
        let groups = vec![
            group(0, 0, 0, &["a"]),
            group(1, 0, 0, &[""]),
            group(1, 1, 0, &["b", "c"]),
            group(1, 0, 1, &["d"]),
            group(1, 1, 1, &["e"]),
        ];
        let (mut writer, buf) = memory_writer();
        let options = TileWriteOptions {
            batch_size: 2,
            emit_empty_tiles: false,
        };
        let (stats, metadata) =
            write_tiles(groups.into_iter(), &ConcatProfile, &mut writer, &pool(), options).unwrap();

        assert_eq!(stats.tiles_written, 4);
        assert_eq!(stats.tiles_skipped, 1);
        assert_eq!(stats.features, 6);
        assert_eq!(writer.tiles_written(), 4);

        let layers = metadata.vector_layers.unwrap();
        assert_eq!(layers[0].id, "features");
        assert_eq!((layers[0].min_zoom, layers[0].max_zoom), (Some(0), Some(1)));

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(text, "0,0,0,YQ==\n1,0,1,YmM=\n0,1,1,ZA==\n1,1,1,ZQ==\n");
    }

    #[test]
    fn test_emit_empty_tiles() {
        let groups = vec![group(0, 0, 0, &[""])];
        let (mut writer, _buf) = memory_writer();
        let options = TileWriteOptions {
            batch_size: 8,
            emit_empty_tiles: true,
        };
        let (stats, _) =
            write_tiles(groups.into_iter(), &ConcatProfile, &mut writer, &pool(), options).unwrap();
        assert_eq!(stats.tiles_written, 1);
        assert_eq!(stats.tiles_skipped, 0);
    }

    #[test]
    fn test_sort_error_aborts() {
        let groups = vec![
            group(0, 0, 0, &["a"]),
            Err(SortError::Corruption("chunk 3".into())),
        ];
        let (mut writer, _buf) = memory_writer();
        let options = TileWriteOptions {
            batch_size: 8,
            emit_empty_tiles: false,
        };
        let err =
            write_tiles(groups.into_iter(), &ConcatProfile, &mut writer, &pool(), options).unwrap_err();
        assert!(matches!(err, PipelineError::Sort(SortError::Corruption(_))));
    }

    #[test]
    fn test_render_error_names_tile() {
        struct Failing;
        impl Profile for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn render_tile(&self, _tile: &TileFeatures) -> anyhow::Result<TileEncodingResult> {
                anyhow::bail!("no renderer")
            }
        }

        let (mut writer, _buf) = memory_writer();
        let options = TileWriteOptions {
            batch_size: 8,
            emit_empty_tiles: false,
        };
        let err = write_tiles(
            vec![group(2, 1, 3, &["x"])].into_iter(),
            &Failing,
            &mut writer,
            &pool(),
            options,
        )
        .unwrap_err();
        match err {
            PipelineError::Render { coord, .. } => assert_eq!(coord.to_string(), "2/1/3"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
