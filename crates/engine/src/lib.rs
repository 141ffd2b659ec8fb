//! Pipeline engine for tilepress
//!
//! This crate drives a build from ingestion to a finished archive:
//! - PipelineRunner: registered stages, overwrite policy, run lifecycle
//! - Stage / StageContext: named ingestion work feeding the feature sorter
//! - Profile: per-tile rendering, called from the render pool
//! - NodeLocationStore: disk-backed id → location table for ingestion
//! - PipelineConfig: TOML-backed run configuration
//!
//! The engine is the only component that owns temporary files; every
//! lower layer is handed the paths it works in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod node_store;
pub mod profile;
pub mod runner;
pub mod stage;
pub mod tile_writer;

pub use config::{OutputSection, PipelineConfig, SortSection, CONFIG_FILE_NAME};
pub use error::{PipelineError, PipelineResult};
pub use node_store::{NodeLocationStore, NodeStoreError};
pub use profile::Profile;
pub use runner::{PipelineRunner, RunSummary};
pub use stage::{Stage, StageContext, StageKind};
pub use tile_writer::{write_tiles, TileWriteOptions, TileWriteStats};
