//! Pipeline error types

use crate::node_store::NodeStoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tilepress_archive::ArchiveError;
use tilepress_core::TileCoord;
use tilepress_storage::SortError;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run.
///
/// `PipelineRunner::run` is the single point where all of these surface.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the runner's current state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Stage name registered twice
    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    /// Output exists and overwriting was not requested
    #[error("Output {} already exists; enable force_overwrite to replace it", .0.display())]
    OutputExists(PathBuf),

    /// IO error outside the sorter and the archive
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Feature sort failed
    #[error("Sort failed: {0}")]
    Sort(#[from] SortError),

    /// Archive write failed
    #[error("Archive write failed: {0}")]
    Archive(#[from] ArchiveError),

    /// Node location store failed
    #[error("Node store failed: {0}")]
    NodeStore(#[from] NodeStoreError),

    /// A stage task failed
    #[error("Stage {stage} failed: {source}")]
    Stage {
        /// Stage name
        stage: String,
        /// Error returned by the task
        #[source]
        source: anyhow::Error,
    },

    /// The profile failed to render a tile
    #[error("Rendering tile {coord} failed: {source}")]
    Render {
        /// Tile being rendered
        coord: TileCoord,
        /// Error returned by the profile
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Config(msg.into())
    }

    /// Create an illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        PipelineError::IllegalState(msg.into())
    }
}
