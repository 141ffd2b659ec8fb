//! Spill chunk file format.
//!
//! Chunks are named `chunk-NNNNNN.chunk` where `NNNNNN` is a zero-padded
//! chunk number. A chunk is written under a `.tmp` name and renamed once
//! complete, so a `.chunk` file is never partial.
//!
//! # Chunk Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Chunk Header (32 bytes)            │
//! ├────────────────────────────────────┤
//! │ Body (records, optionally zstd)    │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────┬──────────┐
//! │ Sort key (8)    │ Length (4)       │ Payload (variable)  │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────┴──────────┘
//! ```
//!
//! The CRC covers key, length and payload. All integers are little-endian.

use crate::config::SorterConfig;
use crate::error::{SortError, SortResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tilepress_core::EncodedFeature;

/// Magic bytes identifying a spill chunk: "TPSC"
pub const CHUNK_MAGIC: [u8; 4] = *b"TPSC";

/// Current chunk format version
pub const CHUNK_FORMAT_VERSION: u32 = 1;

/// Size of chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 32;

/// Header flag: body is a single zstd frame
pub const FLAG_ZSTD: u32 = 0x1;

const IO_BUFFER_SIZE: usize = 256 * 1024;

/// Spill chunk header (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Magic bytes: "TPSC"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Body flags (`FLAG_ZSTD`)
    pub flags: u32,

    /// Chunk number (creation order)
    pub chunk_number: u64,

    /// Number of records in the body
    pub record_count: u64,
}

impl ChunkHeader {
    /// Create a new chunk header.
    pub fn new(chunk_number: u64, record_count: u64, compressed: bool) -> Self {
        ChunkHeader {
            magic: CHUNK_MAGIC,
            format_version: CHUNK_FORMAT_VERSION,
            flags: if compressed { FLAG_ZSTD } else { 0 },
            chunk_number,
            record_count,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut bytes = [0u8; CHUNK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.flags.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.chunk_number.to_le_bytes());
        bytes[20..28].copy_from_slice(&self.record_count.to_le_bytes());
        // 28..32 reserved
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; CHUNK_HEADER_SIZE]) -> Option<Self> {
        Some(ChunkHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            flags: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
            chunk_number: u64::from_le_bytes(bytes[12..20].try_into().ok()?),
            record_count: u64::from_le_bytes(bytes[20..28].try_into().ok()?),
        })
    }

    /// Validate the header has correct magic bytes and a known version.
    pub fn is_valid(&self) -> bool {
        self.magic == CHUNK_MAGIC && self.format_version == CHUNK_FORMAT_VERSION
    }

    /// Whether the body is zstd-compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_ZSTD != 0
    }
}

/// A completed, immutable spill chunk on disk.
#[derive(Debug, Clone)]
pub struct SpillChunk {
    /// Path to the chunk file
    pub path: PathBuf,
    /// Chunk number (creation order)
    pub chunk_number: u64,
    /// Records in the chunk
    pub record_count: u64,
    /// File size in bytes
    pub size_bytes: u64,
}

impl SpillChunk {
    /// Generate chunk file path.
    ///
    /// Format: `chunk-NNNNNN.chunk` where NNNNNN is zero-padded chunk number.
    pub fn chunk_path(dir: &Path, chunk_number: u64) -> PathBuf {
        dir.join(format!("chunk-{:06}.chunk", chunk_number))
    }

    fn temp_path(dir: &Path, chunk_number: u64) -> PathBuf {
        dir.join(format!("chunk-{:06}.tmp", chunk_number))
    }

    /// Write already-sorted features as chunk `chunk_number` in `dir`.
    ///
    /// Either the complete chunk exists afterwards or no file is left behind.
    pub fn write(
        dir: &Path,
        chunk_number: u64,
        features: &[EncodedFeature],
        config: &SorterConfig,
    ) -> SortResult<Self> {
        let temp_path = Self::temp_path(dir, chunk_number);
        let path = Self::chunk_path(dir, chunk_number);
        let header = ChunkHeader::new(chunk_number, features.len() as u64, config.compress);

        let written = Self::write_inner(&temp_path, &header, features, config).and_then(|size| {
            fs::rename(&temp_path, &path)?;
            Ok(size)
        });
        match written {
            Ok(size_bytes) => {
                Ok(SpillChunk {
                    path,
                    chunk_number,
                    record_count: header.record_count,
                    size_bytes,
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    fn write_inner(
        path: &Path,
        header: &ChunkHeader,
        features: &[EncodedFeature],
        config: &SorterConfig,
    ) -> SortResult<u64> {
        let file = OpenOptions::new().create_new(true).write(true).open(path)?;
        let mut out = BufWriter::with_capacity(IO_BUFFER_SIZE, file);
        out.write_all(&header.to_bytes())?;

        if header.is_compressed() {
            let mut encoder = zstd::Encoder::new(out, config.compression_level)?;
            write_records(&mut encoder, features)?;
            out = encoder.finish()?;
        } else {
            write_records(&mut out, features)?;
        }

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(file.metadata()?.len())
    }

    /// Delete the chunk file.
    pub fn delete(&self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

fn record_crc(sort_key: u64, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&sort_key.to_le_bytes());
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

fn write_records<W: Write>(out: &mut W, features: &[EncodedFeature]) -> SortResult<()> {
    for feature in features {
        let len = u32::try_from(feature.payload.len())
            .map_err(|_| SortError::FeatureTooLarge(feature.payload.len()))?;
        out.write_u64::<LittleEndian>(feature.sort_key)?;
        out.write_u32::<LittleEndian>(len)?;
        out.write_all(&feature.payload)?;
        out.write_u32::<LittleEndian>(record_crc(feature.sort_key, &feature.payload))?;
    }
    Ok(())
}

/// Sequential reader over one chunk's records.
///
/// Streams through the body; never seeks or maps the file.
pub struct ChunkReader {
    body: Box<dyn Read + Send>,
    path: PathBuf,
    header: ChunkHeader,
    remaining: u64,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl ChunkReader {
    /// Open a chunk and validate its header.
    pub fn open(path: &Path) -> SortResult<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);

        let mut header_bytes = [0u8; CHUNK_HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SortError::Corruption(format!("{}: truncated chunk header", path.display()))
            } else {
                SortError::Io(e)
            }
        })?;

        let header = ChunkHeader::from_bytes(&header_bytes).ok_or_else(|| {
            SortError::Corruption(format!("{}: invalid chunk header", path.display()))
        })?;

        if !header.is_valid() {
            return Err(SortError::Corruption(format!(
                "{}: invalid chunk magic or version {}",
                path.display(),
                header.format_version
            )));
        }

        let body: Box<dyn Read + Send> = if header.is_compressed() {
            Box::new(zstd::Decoder::with_buffer(reader)?)
        } else {
            Box::new(reader)
        };

        Ok(ChunkReader {
            body,
            path: path.to_path_buf(),
            header,
            remaining: header.record_count,
        })
    }

    /// Chunk header.
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Path of the chunk being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next record, `None` once the header's record count is reached.
    pub fn next_record(&mut self) -> SortResult<Option<EncodedFeature>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let sort_key = self.body.read_u64::<LittleEndian>().map_err(|e| self.read_error(e))?;
        let len = self.body.read_u32::<LittleEndian>().map_err(|e| self.read_error(e))? as usize;
        let mut payload = vec![0u8; len];
        self.body
            .read_exact(&mut payload)
            .map_err(|e| self.read_error(e))?;
        let stored_crc = self.body.read_u32::<LittleEndian>().map_err(|e| self.read_error(e))?;

        let computed_crc = record_crc(sort_key, &payload);
        if stored_crc != computed_crc {
            return Err(SortError::Corruption(format!(
                "{}: checksum mismatch (stored {:#010x}, computed {:#010x})",
                self.path.display(),
                stored_crc,
                computed_crc
            )));
        }

        self.remaining -= 1;
        Ok(Some(EncodedFeature::from_raw(sort_key, payload)))
    }

    fn read_error(&self, e: io::Error) -> SortError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SortError::Corruption(format!(
                "{}: truncated, {} of {} records missing",
                self.path.display(),
                self.remaining,
                self.header.record_count
            ))
        } else {
            SortError::Io(e)
        }
    }
}
