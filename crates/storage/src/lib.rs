//! Storage layer for tilepress
//!
//! This crate implements the out-of-core feature sort and per-tile grouping:
//! - FeatureSorter: buffers features, spills sorted chunks to disk, merges on `sort()`
//! - Spill chunk format: header + CRC-checked records, optionally zstd-compressed
//! - SortedFeatures: k-way merge iterator over all chunks plus the residual buffer
//! - TileGrouper: one batch of features per tile, in tile order
//!
//! # Memory Bound
//!
//! The sorter never holds more than one chunk's worth of features in memory
//! while ingesting; the merge holds one record per chunk; the grouper holds
//! one tile.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod group;
pub mod merge;
pub mod sorter;

pub use chunk::{ChunkHeader, ChunkReader, SpillChunk, CHUNK_HEADER_SIZE, CHUNK_MAGIC};
pub use config::{SorterConfig, SorterConfigError};
pub use error::{SortError, SortResult};
pub use group::{TileFeatures, TileGrouper};
pub use merge::SortedFeatures;
pub use sorter::{FeatureSorter, SortCounters};
