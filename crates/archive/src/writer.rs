//! Archive writer trait and the sharded stream writer

use crate::config::{ArchiveFormat, StreamArchiveConfig};
use crate::csv::CsvEncoder;
use crate::error::{ArchiveError, ArchiveResult};
use crate::proto::ProtoEncoder;
use crate::shard::StreamShard;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tilepress_core::{ArchiveMetadata, TileEncodingResult};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Destination for rendered tiles.
///
/// Call order: `initialize`, `write` for each tile in ascending tile order,
/// `finish`. Whether `initialize` may be skipped depends on the format.
pub trait ArchiveWriter: Send {
    /// Write the header with metadata known before any tile.
    fn initialize(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<()>;

    /// Append one tile.
    fn write(&mut self, tile: &TileEncodingResult) -> ArchiveResult<()>;

    /// Write the footer with final metadata and release all destinations.
    fn finish(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<()>;

    /// Number of physical destinations.
    fn shard_count(&self) -> usize;
}

/// Record encoding of one stream format.
pub trait EntryEncoder: Send + Sync + std::fmt::Debug {
    /// Whether `initialize` must precede the first tile.
    fn requires_initialize(&self) -> bool;

    /// Encode the header.
    fn encode_initialize(&self, metadata: &ArchiveMetadata, out: &mut dyn Write) -> ArchiveResult<()>;

    /// Encode one tile.
    fn encode_tile(&self, tile: &TileEncodingResult, out: &mut dyn Write) -> ArchiveResult<()>;

    /// Encode the footer.
    fn encode_finish(&self, metadata: &ArchiveMetadata, out: &mut dyn Write) -> ArchiveResult<()>;
}

/// Shard receiving the tile with `tile_id`, out of `shards`.
#[inline]
pub fn route_shard(tile_id: u32, shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    (xxh3_64(&tile_id.to_be_bytes()) % shards as u64) as usize
}

/// Path of shard `index`: the base path for shard 0, the base path with
/// the index appended otherwise.
pub fn shard_path(base: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let mut name = OsString::from(base.as_os_str());
    name.push(index.to_string());
    PathBuf::from(name)
}

/// Encoder for `config`'s format.
pub fn encoder_for(config: &StreamArchiveConfig) -> Arc<dyn EntryEncoder> {
    match config.format {
        ArchiveFormat::Csv | ArchiveFormat::Tsv => Arc::new(CsvEncoder::new(config.csv.clone())),
        ArchiveFormat::Proto => Arc::new(ProtoEncoder),
    }
}

/// Archive writer spreading tiles over independent stream shards.
///
/// `initialize` and `finish` apply to every shard, so each shard is a
/// complete stream on its own.
#[derive(Debug)]
pub struct StreamArchiveWriter<W: Write + Send> {
    shards: Vec<StreamShard<W>>,
    tiles_written: u64,
}

impl<W: Write + Send> StreamArchiveWriter<W> {
    /// Create a writer over prepared shards, indexed by position. At least
    /// one shard is required.
    pub fn from_shards(shards: Vec<StreamShard<W>>) -> ArchiveResult<Self> {
        if shards.is_empty() {
            return Err(ArchiveError::InvalidOption {
                name: "shards",
                value: "0".into(),
            });
        }
        Ok(StreamArchiveWriter {
            shards,
            tiles_written: 0,
        })
    }

    /// Shards, indexed by shard number.
    pub fn shards(&self) -> &[StreamShard<W>] {
        &self.shards
    }

    /// Tiles written across all shards.
    pub fn tiles_written(&self) -> u64 {
        self.tiles_written
    }

    /// Finish every shard and hand back their destinations.
    pub fn finish_into_inner(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<Vec<W>> {
        let mut out = Vec::with_capacity(self.shards.len());
        for shard in &mut self.shards {
            out.push(shard.finish(metadata)?);
        }
        Ok(out)
    }
}

impl StreamArchiveWriter<File> {
    /// Create a file-backed writer for `path`.
    ///
    /// Shard files are opened on first use: created exclusively, or opened
    /// for appending in append mode.
    pub fn create(path: &Path, config: &StreamArchiveConfig) -> ArchiveResult<Self> {
        config.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoder = encoder_for(config);
        let shards = (0..config.shards)
            .map(|index| {
                let shard_path = shard_path(path, index);
                let append = config.append;
                StreamShard::new(index, Arc::clone(&encoder), move || {
                    debug!(target: "tilepress::archive", path = %shard_path.display(), append, "Opening shard");
                    if append {
                        OpenOptions::new().append(true).create(true).open(&shard_path)
                    } else {
                        OpenOptions::new().write(true).create_new(true).open(&shard_path)
                    }
                })
            })
            .collect();

        info!(
            target: "tilepress::archive",
            path = %path.display(),
            format = %config.format,
            shards = config.shards,
            append = config.append,
            "Opened stream archive"
        );
        Self::from_shards(shards)
    }
}

impl<W: Write + Send> ArchiveWriter for StreamArchiveWriter<W> {
    fn initialize(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<()> {
        for shard in &mut self.shards {
            shard.initialize(metadata)?;
        }
        Ok(())
    }

    fn write(&mut self, tile: &TileEncodingResult) -> ArchiveResult<()> {
        let index = route_shard(tile.coord.encode(), self.shards.len());
        self.shards[index].write(tile)?;
        self.tiles_written += 1;
        Ok(())
    }

    fn finish(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<()> {
        self.finish_into_inner(metadata)?;
        info!(
            target: "tilepress::archive",
            tiles = self.tiles_written,
            shards = self.shards.len(),
            "Finished stream archive"
        );
        Ok(())
    }

    fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

/// Open a file-backed archive writer for `config.format` at `path`.
pub fn open_archive(path: &Path, config: &StreamArchiveConfig) -> ArchiveResult<Box<dyn ArchiveWriter>> {
    Ok(Box::new(StreamArchiveWriter::create(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsvOptions;
    use tilepress_core::TileCoord;

    #[test]
    fn test_shard_path_naming() {
        let base = Path::new("/out/tiles.csv");
        assert_eq!(shard_path(base, 0), PathBuf::from("/out/tiles.csv"));
        assert_eq!(shard_path(base, 1), PathBuf::from("/out/tiles.csv1"));
        assert_eq!(shard_path(base, 12), PathBuf::from("/out/tiles.csv12"));
    }

    #[test]
    fn test_route_is_deterministic_and_in_range() {
        for id in 0..1000u32 {
            let shard = route_shard(id, 3);
            assert!(shard < 3);
            assert_eq!(shard, route_shard(id, 3));
            assert_eq!(route_shard(id, 1), 0);
        }
    }

    #[test]
    fn test_route_spreads_tiles() {
        let mut counts = [0usize; 4];
        for id in 0..4000u32 {
            counts[route_shard(id, 4)] += 1;
        }
        assert!(counts.iter().all(|c| *c > 500), "{:?}", counts);
    }

    #[test]
    fn test_in_memory_sharded_writer() {
        let encoder: Arc<dyn EntryEncoder> = Arc::new(CsvEncoder::new(CsvOptions::csv()));
        let shards = (0..2)
            .map(|i| StreamShard::from_writer(i, Arc::clone(&encoder), Vec::new()))
            .collect();
        let mut writer = StreamArchiveWriter::from_shards(shards).unwrap();

        for x in 0..4 {
            let coord = TileCoord::new(2, x, 0).unwrap();
            writer.write(&TileEncodingResult::new(coord, None)).unwrap();
        }
        let outputs = writer.finish_into_inner(&ArchiveMetadata::new()).unwrap();

        let total_lines: usize = outputs
            .iter()
            .map(|o| String::from_utf8(o.clone()).unwrap().lines().count())
            .sum();
        assert_eq!(total_lines, 4);
        assert_eq!(writer.tiles_written(), 4);
        assert_eq!(writer.shard_count(), 2);
    }

    #[test]
    fn test_empty_shard_list_rejected() {
        let result = StreamArchiveWriter::<Vec<u8>>::from_shards(Vec::new());
        assert!(matches!(
            result,
            Err(ArchiveError::InvalidOption { name: "shards", .. })
        ));
    }
}
