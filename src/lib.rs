//! tilepress - out-of-core map tile archive builder
//!
//! tilepress turns a stream of per-tile features, produced by ingestion
//! stages, into a tile archive: features are spilled to disk in sorted
//! chunks, merged back in tile order, rendered tile by tile by a
//! [`Profile`], and written as CSV/TSV lines or length-delimited protobuf
//! entries, optionally sharded across several files.
//!
//! # Quick Start
//!
//! ```ignore
//! use tilepress::{PipelineConfig, PipelineRunner};
//!
//! let mut runner = PipelineRunner::new(PipelineConfig::default());
//! runner
//!     .set_profile(MyProfile)
//!     .set_output("data/output.csv")
//!     .add_source("osm", "read OpenStreetMap features", |ctx| {
//!         for feature in read_features()? {
//!             ctx.emit(feature)?;
//!         }
//!         Ok(())
//!     })?;
//! let summary = runner.run()?;
//! ```
//!
//! # Architecture
//!
//! - [`types`]: tile coordinates, encoded features, archive metadata
//! - [`storage`]: spillable sorter, k-way merge, tile grouper
//! - [`archive`]: stream archive writers and readers
//! - [`engine`]: stages, profiles, and the pipeline runner

pub use tilepress_archive as archive;
pub use tilepress_core as types;
pub use tilepress_engine as engine;
pub use tilepress_storage as storage;

pub use tilepress_core::{ArchiveMetadata, EncodedFeature, TileCoord, TileEncodingResult};
pub use tilepress_engine::{
    PipelineConfig, PipelineError, PipelineResult, PipelineRunner, Profile, RunSummary,
    StageContext,
};
pub use tilepress_storage::TileFeatures;
