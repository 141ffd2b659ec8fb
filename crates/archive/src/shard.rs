//! One shard of a stream archive
//!
//! ```text
//! Unopened ──initialize──► Open ──write*──► Open ──finish──► Closed
//!     │                                                   ▲
//!     └──────── write / finish (optional-initialize formats) ┘
//! ```
//!
//! The destination is opened lazily on the first operation and released on
//! `finish` or drop, whichever comes first.

use crate::error::{ArchiveError, ArchiveResult};
use crate::writer::EntryEncoder;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use tilepress_core::{ArchiveMetadata, TileEncodingResult};

const SHARD_BUFFER_SIZE: usize = 64 * 1024;

type Opener<W> = Box<dyn FnOnce() -> io::Result<W> + Send>;

/// Lifecycle state of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Destination not opened yet
    Unopened,
    /// Accepting tiles
    Open,
    /// Finished; destination released
    Closed,
}

impl ShardState {
    fn as_str(&self) -> &'static str {
        match self {
            ShardState::Unopened => "unopened",
            ShardState::Open => "open",
            ShardState::Closed => "closed",
        }
    }
}

/// Independent stream of one shard, exclusively owning its destination.
pub struct StreamShard<W: Write> {
    index: usize,
    encoder: Arc<dyn EntryEncoder>,
    opener: Option<Opener<W>>,
    out: Option<BufWriter<W>>,
    state: ShardState,
    tiles_written: u64,
}

impl<W: Write> std::fmt::Debug for StreamShard<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamShard")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("tiles_written", &self.tiles_written)
            .finish()
    }
}

impl<W: Write> StreamShard<W> {
    /// Create a shard whose destination is produced by `open` on first use.
    pub fn new(
        index: usize,
        encoder: Arc<dyn EntryEncoder>,
        open: impl FnOnce() -> io::Result<W> + Send + 'static,
    ) -> Self {
        StreamShard {
            index,
            encoder,
            opener: Some(Box::new(open)),
            out: None,
            state: ShardState::Unopened,
            tiles_written: 0,
        }
    }

    /// Create a shard over an already open destination.
    pub fn from_writer(index: usize, encoder: Arc<dyn EntryEncoder>, writer: W) -> Self
    where
        W: Send + 'static,
    {
        Self::new(index, encoder, move || Ok(writer))
    }

    /// Shard index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current state.
    pub fn state(&self) -> ShardState {
        self.state
    }

    /// Tiles written to this shard.
    pub fn tiles_written(&self) -> u64 {
        self.tiles_written
    }

    fn illegal(&self, operation: &'static str) -> ArchiveError {
        ArchiveError::State {
            shard: self.index,
            operation,
            state: self.state.as_str(),
        }
    }

    fn open(&mut self) -> ArchiveResult<()> {
        let opener = self.opener.take().ok_or_else(|| self.illegal("open"))?;
        let writer = opener()?;
        self.out = Some(BufWriter::with_capacity(SHARD_BUFFER_SIZE, writer));
        self.state = ShardState::Open;
        Ok(())
    }

    /// Open the destination implicitly, for formats that allow skipping
    /// `initialize`.
    fn ensure_open(&mut self, operation: &'static str) -> ArchiveResult<()> {
        match self.state {
            ShardState::Open => Ok(()),
            ShardState::Unopened if !self.encoder.requires_initialize() => self.open(),
            _ => Err(self.illegal(operation)),
        }
    }

    fn out(&mut self) -> ArchiveResult<&mut BufWriter<W>> {
        let state = self.state.as_str();
        let shard = self.index;
        self.out.as_mut().ok_or(ArchiveError::State {
            shard,
            operation: "write",
            state,
        })
    }

    /// Open the destination and write the header entry.
    pub fn initialize(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<()> {
        if self.state != ShardState::Unopened {
            return Err(self.illegal("initialize"));
        }
        self.open()?;
        let encoder = Arc::clone(&self.encoder);
        encoder.encode_initialize(metadata, self.out()?)
    }

    /// Append one tile.
    pub fn write(&mut self, tile: &TileEncodingResult) -> ArchiveResult<()> {
        self.ensure_open("write")?;
        let encoder = Arc::clone(&self.encoder);
        encoder.encode_tile(tile, self.out()?)?;
        self.tiles_written += 1;
        Ok(())
    }

    /// Write the footer entry, flush and release the destination.
    pub fn finish(&mut self, metadata: &ArchiveMetadata) -> ArchiveResult<W> {
        self.ensure_open("finish")?;
        let encoder = Arc::clone(&self.encoder);
        encoder.encode_finish(metadata, self.out()?)?;

        self.state = ShardState::Closed;
        let out = self.out.take().ok_or_else(|| self.illegal("finish"))?;
        let writer = out.into_inner().map_err(|e| e.into_error())?;
        Ok(writer)
    }
}
