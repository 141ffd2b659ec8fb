//! Out-of-core feature sorter
//!
//! Features are buffered in memory until the buffer reaches the configured
//! chunk size, then sorted and spilled to a chunk file. `sort()` finalizes
//! the sorter and returns a merge over every chunk plus whatever is still
//! buffered.
//!
//! Ties on `sort_key` resolve by arrival: chunks in creation order, the
//! residual buffer last, insertion order within a chunk.

use crate::chunk::SpillChunk;
use crate::config::SorterConfig;
use crate::error::{SortError, SortResult};
use crate::merge::SortedFeatures;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use tilepress_core::EncodedFeature;
use tracing::{debug, info};

/// Counters exposed for progress logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortCounters {
    /// Features accepted by `add`
    pub features_added: u64,
    /// Chunk files written
    pub chunks_spilled: u64,
    /// Bytes written to chunk files
    pub bytes_spilled: u64,
}

struct SorterState {
    buffer: Vec<EncodedFeature>,
    buffer_bytes: u64,
    chunks: Vec<SpillChunk>,
    next_chunk: u64,
    sorted: bool,
    /// Set when a spill fails; the sorter refuses all further work
    failed: bool,
    counters: SortCounters,
}

/// Sorter of encoded features that spills to `dir` when memory runs out.
///
/// `add` may be called from several stage workers at once.
pub struct FeatureSorter {
    dir: PathBuf,
    config: SorterConfig,
    pool: Option<rayon::ThreadPool>,
    state: Mutex<SorterState>,
}

impl std::fmt::Debug for FeatureSorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureSorter")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("counters", &self.counters())
            .finish()
    }
}

#[inline]
fn estimated_size(feature: &EncodedFeature) -> u64 {
    (feature.payload.len() + mem::size_of::<EncodedFeature>()) as u64
}

impl FeatureSorter {
    /// Create a sorter spilling into `dir`, which is created if missing.
    pub fn new(dir: impl AsRef<Path>, config: SorterConfig) -> SortResult<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let pool = if config.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("tilepress-sort-{}", i))
                .build()
                .map_err(|e| SortError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            Some(pool)
        } else {
            None
        };

        debug!(
            target: "tilepress::sort",
            dir = %dir.display(),
            chunk_bytes = config.chunk_bytes,
            compress = config.compress,
            "Feature sorter created"
        );

        Ok(FeatureSorter {
            dir,
            config,
            pool,
            state: Mutex::new(SorterState {
                buffer: Vec::new(),
                buffer_bytes: 0,
                chunks: Vec::new(),
                next_chunk: 0,
                sorted: false,
                failed: false,
                counters: SortCounters::default(),
            }),
        })
    }

    /// Spill directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sorter configuration.
    pub fn config(&self) -> &SorterConfig {
        &self.config
    }

    /// Snapshot of the progress counters.
    pub fn counters(&self) -> SortCounters {
        self.state.lock().counters
    }

    /// Chunks spilled so far.
    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Add one feature, spilling the buffer if it is full.
    pub fn add(&self, feature: EncodedFeature) -> SortResult<()> {
        if u32::try_from(feature.payload.len()).is_err() {
            return Err(SortError::FeatureTooLarge(feature.payload.len()));
        }

        let mut state = self.state.lock();
        if state.failed {
            return Err(SortError::Poisoned);
        }
        if state.sorted {
            return Err(SortError::AlreadySorted);
        }

        state.buffer_bytes += estimated_size(&feature);
        state.buffer.push(feature);
        state.counters.features_added += 1;

        if self.buffer_full(&state) {
            if let Err(e) = self.spill(&mut state) {
                state.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    fn buffer_full(&self, state: &SorterState) -> bool {
        state.buffer_bytes >= self.config.chunk_bytes
            || self
                .config
                .chunk_features
                .is_some_and(|limit| state.buffer.len() >= limit)
    }

    fn sort_buffer(&self, buffer: &mut [EncodedFeature]) {
        // Both sorts are stable: equal keys keep insertion order
        match &self.pool {
            Some(pool) => pool.install(|| buffer.par_sort_by_key(|f| f.sort_key)),
            None => buffer.sort_by_key(|f| f.sort_key),
        }
    }

    fn spill(&self, state: &mut SorterState) -> SortResult<()> {
        let mut buffer = mem::take(&mut state.buffer);
        state.buffer_bytes = 0;
        self.sort_buffer(&mut buffer);

        let chunk_number = state.next_chunk;
        state.next_chunk += 1;

        let chunk = SpillChunk::write(&self.dir, chunk_number, &buffer, &self.config)?;
        state.counters.chunks_spilled += 1;
        state.counters.bytes_spilled += chunk.size_bytes;

        debug!(
            target: "tilepress::sort",
            chunk = chunk_number,
            records = chunk.record_count,
            bytes = chunk.size_bytes,
            "Spilled chunk"
        );

        state.chunks.push(chunk);
        Ok(())
    }

    /// Finalize the sorter and return every feature in key order.
    ///
    /// May be called once; later `add` or `sort` calls fail with
    /// [`SortError::AlreadySorted`]. The returned iterator deletes chunk
    /// files as it drains them.
    pub fn sort(&self) -> SortResult<SortedFeatures> {
        let (chunks, mut residual) = {
            let mut state = self.state.lock();
            if state.failed {
                return Err(SortError::Poisoned);
            }
            if state.sorted {
                return Err(SortError::AlreadySorted);
            }
            state.sorted = true;
            state.buffer_bytes = 0;
            (mem::take(&mut state.chunks), mem::take(&mut state.buffer))
        };

        self.sort_buffer(&mut residual);

        let counters = self.counters();
        info!(
            target: "tilepress::sort",
            features = counters.features_added,
            chunks = chunks.len(),
            bytes_spilled = counters.bytes_spilled,
            residual = residual.len(),
            "Merging sorted features"
        );

        SortedFeatures::open(chunks, residual)
    }
}

impl Drop for FeatureSorter {
    fn drop(&mut self) {
        // Chunks not handed to a merge are never read again
        let state = self.state.get_mut();
        for chunk in state.chunks.drain(..) {
            let _ = chunk.delete();
        }
    }
}
