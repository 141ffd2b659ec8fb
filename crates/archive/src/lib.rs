//! Streaming tile archive writers for tilepress
//!
//! Turns an ordered sequence of rendered tiles into a durable output:
//! - ArchiveWriter: initialize / write / finish capability trait
//! - StreamArchiveWriter: one or more shards, each an independent stream
//! - CSV / TSV lines and length-delimited protobuf entries
//! - Readers for both encodings
//!
//! # Shards
//!
//! Tiles are routed to shards by a hash of their tile id, so a tile always
//! lands in the same shard. Order is preserved within a shard, not across
//! shards. Shard 0 writes to the configured path, shard `i > 0` to the path
//! with `i` appended.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod csv;
pub mod error;
pub mod proto;
pub mod reader;
pub mod shard;
pub mod writer;

pub use config::{ArchiveFormat, BinaryEncoding, CsvOptions, StreamArchiveConfig};
pub use csv::{CsvEncoder, CsvTileRecord};
pub use error::{ArchiveError, ArchiveResult};
pub use proto::ProtoEncoder;
pub use reader::{CsvReader, ProtoStreamReader};
pub use shard::{ShardState, StreamShard};
pub use writer::{
    open_archive, route_shard, shard_path, ArchiveWriter, EntryEncoder, StreamArchiveWriter,
};
