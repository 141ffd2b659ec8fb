//! Feature sorter configuration.

/// Default in-memory chunk size before spilling (256MB).
pub const DEFAULT_CHUNK_BYTES: u64 = 256 * 1024 * 1024;

/// Feature sorter configuration parameters.
#[derive(Debug, Clone)]
pub struct SorterConfig {
    /// Estimated buffer size in bytes that triggers a spill (default: 256MB).
    pub chunk_bytes: u64,

    /// Buffered feature count that triggers a spill, if set.
    ///
    /// Whichever of `chunk_bytes` and `chunk_features` is reached first wins.
    pub chunk_features: Option<usize>,

    /// zstd-compress chunk bodies (default: false).
    pub compress: bool,

    /// zstd level when `compress` is set (default: 1).
    pub compression_level: i32,

    /// Worker threads for the in-memory sort of a chunk (default: 1).
    pub threads: usize,
}

impl Default for SorterConfig {
    fn default() -> Self {
        SorterConfig {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            chunk_features: None,
            compress: false,
            compression_level: 1,
            threads: 1,
        }
    }
}

impl SorterConfig {
    /// Create a new sorter configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set spill size in bytes (builder pattern).
    pub fn with_chunk_bytes(mut self, bytes: u64) -> Self {
        self.chunk_bytes = bytes;
        self
    }

    /// Set spill size in features (builder pattern).
    pub fn with_chunk_features(mut self, features: usize) -> Self {
        self.chunk_features = Some(features);
        self
    }

    /// Enable or disable chunk compression (builder pattern).
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set sort worker threads (builder pattern).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), SorterConfigError> {
        if self.chunk_bytes == 0 {
            return Err(SorterConfigError::ZeroChunkBytes);
        }
        if self.chunk_features == Some(0) {
            return Err(SorterConfigError::ZeroChunkFeatures);
        }
        if self.threads == 0 {
            return Err(SorterConfigError::ZeroThreads);
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(SorterConfigError::CompressionLevel(self.compression_level));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small chunks).
    pub fn for_testing() -> Self {
        SorterConfig {
            chunk_bytes: 4 * 1024,
            ..Default::default()
        }
    }
}

/// Sorter configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SorterConfigError {
    /// Spill size of zero bytes.
    #[error("Chunk size must be at least 1 byte")]
    ZeroChunkBytes,

    /// Spill size of zero features.
    #[error("Chunk feature limit must be at least 1")]
    ZeroChunkFeatures,

    /// No sort threads.
    #[error("Sort threads must be at least 1")]
    ZeroThreads,

    /// zstd level outside 1..=22.
    #[error("Compression level {0} outside 1..=22")]
    CompressionLevel(i32),
}
