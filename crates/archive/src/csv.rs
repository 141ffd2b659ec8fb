//! CSV / TSV tile lines
//!
//! One line per tile: `x<sep>y<sep>z<sep>data<line sep>`, with `data` the
//! tile bytes in the configured [`BinaryEncoding`] and empty for a tile
//! without data. Nothing is quoted or escaped.
//!
//! [`BinaryEncoding`]: crate::BinaryEncoding

use crate::config::CsvOptions;
use crate::error::{ArchiveError, ArchiveResult};
use crate::writer::EntryEncoder;
use std::io::Write;
use tilepress_core::{ArchiveMetadata, TileCoord, TileEncodingResult};

/// Line encoder for CSV and TSV archives.
///
/// Metadata is not part of the format, so `initialize` and `finish` write
/// nothing and `initialize` may be skipped.
#[derive(Debug, Clone)]
pub struct CsvEncoder {
    options: CsvOptions,
}

impl CsvEncoder {
    /// Create an encoder for `options`.
    pub fn new(options: CsvOptions) -> Self {
        CsvEncoder { options }
    }

    /// Encoder options.
    pub fn options(&self) -> &CsvOptions {
        &self.options
    }
}

impl EntryEncoder for CsvEncoder {
    fn requires_initialize(&self) -> bool {
        false
    }

    fn encode_initialize(&self, _metadata: &ArchiveMetadata, _out: &mut dyn Write) -> ArchiveResult<()> {
        Ok(())
    }

    fn encode_tile(&self, tile: &TileEncodingResult, out: &mut dyn Write) -> ArchiveResult<()> {
        let sep = &self.options.column_separator;
        let encoded = tile
            .tile_data
            .as_deref()
            .map(|data| self.options.binary_encoding.encode(data))
            .unwrap_or_default();
        write!(
            out,
            "{x}{sep}{y}{sep}{z}{sep}{encoded}{eol}",
            x = tile.coord.x(),
            y = tile.coord.y(),
            z = tile.coord.z(),
            eol = self.options.line_separator,
        )?;
        Ok(())
    }

    fn encode_finish(&self, _metadata: &ArchiveMetadata, _out: &mut dyn Write) -> ArchiveResult<()> {
        Ok(())
    }
}

/// One decoded CSV / TSV line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTileRecord {
    /// Tile address
    pub coord: TileCoord,
    /// Decoded tile bytes, `None` for an empty data column
    pub data: Option<Vec<u8>>,
}

impl CsvTileRecord {
    /// Parse a line, with or without its trailing line separator.
    pub fn parse(line: &str, options: &CsvOptions) -> ArchiveResult<Self> {
        let line = line
            .strip_suffix(options.line_separator.as_str())
            .unwrap_or(line);
        let mut columns = line.splitn(4, options.column_separator.as_str());

        let mut number = |name: &str| -> ArchiveResult<u32> {
            let column = columns
                .next()
                .ok_or_else(|| ArchiveError::decode(format!("missing {} column in {:?}", name, line)))?;
            column
                .parse()
                .map_err(|_| ArchiveError::decode(format!("invalid {} column {:?}", name, column)))
        };
        let x = number("x")?;
        let y = number("y")?;
        let z = number("z")?;
        let data = columns
            .next()
            .ok_or_else(|| ArchiveError::decode(format!("missing data column in {:?}", line)))?;

        let z = u8::try_from(z).map_err(|_| ArchiveError::decode(format!("invalid zoom {}", z)))?;
        let coord = TileCoord::new(z, x, y).map_err(|e| ArchiveError::decode(e.to_string()))?;
        let data = if data.is_empty() {
            None
        } else {
            Some(options.binary_encoding.decode(data)?)
        };

        Ok(CsvTileRecord { coord, data })
    }
}
