//! K-way merge of spilled chunks and the residual buffer

use crate::chunk::{ChunkReader, SpillChunk};
use crate::error::{SortError, SortResult};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::vec;
use tilepress_core::EncodedFeature;
use tracing::{debug, warn};

enum Source {
    Chunk {
        reader: ChunkReader,
        chunk: SpillChunk,
    },
    Memory(vec::IntoIter<EncodedFeature>),
}

impl Source {
    fn next_feature(&mut self) -> SortResult<Option<EncodedFeature>> {
        match self {
            Source::Chunk { reader, .. } => reader.next_record(),
            Source::Memory(iter) => Ok(iter.next()),
        }
    }
}

/// Head of one source in the merge heap.
///
/// Ordered by `(sort_key, source)` so equal keys come out in source order.
struct HeapEntry {
    feature: EncodedFeature,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.feature
            .sort_key
            .cmp(&other.feature.sort_key)
            .then(self.source.cmp(&other.source))
    }
}

/// Features from every chunk and the residual buffer, in key order.
///
/// Yields `Err` at most once; the iterator is fused after an error. Chunk
/// files are deleted as soon as they are drained, and any still on disk
/// when the iterator is dropped are deleted then.
pub struct SortedFeatures {
    sources: Vec<Option<Source>>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    pending_error: Option<SortError>,
    done: bool,
}

impl std::fmt::Debug for SortedFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedFeatures")
            .field("sources", &self.sources.len())
            .field("heads", &self.heap.len())
            .field("done", &self.done)
            .finish()
    }
}

impl SortedFeatures {
    /// Open every chunk and prime the heap with each source's first feature.
    ///
    /// `residual` must already be sorted. Chunk order is the tie-break order.
    pub(crate) fn open(chunks: Vec<SpillChunk>, residual: Vec<EncodedFeature>) -> SortResult<Self> {
        let mut merged = SortedFeatures {
            sources: Vec::with_capacity(chunks.len() + 1),
            heap: BinaryHeap::with_capacity(chunks.len() + 1),
            pending_error: None,
            done: false,
        };

        let mut chunks = chunks.into_iter();
        while let Some(chunk) = chunks.next() {
            match ChunkReader::open(&chunk.path) {
                Ok(reader) => merged.sources.push(Some(Source::Chunk { reader, chunk })),
                Err(e) => {
                    // Leave nothing behind: this chunk, the rest, and those already opened
                    let _ = chunk.delete();
                    for rest in chunks {
                        let _ = rest.delete();
                    }
                    return Err(e);
                }
            }
        }
        merged.sources.push(Some(Source::Memory(residual.into_iter())));

        for source in 0..merged.sources.len() {
            merged.advance(source)?;
        }
        Ok(merged)
    }

    /// Pull the next feature of `source` into the heap, retiring the source
    /// when it is exhausted.
    fn advance(&mut self, source: usize) -> SortResult<()> {
        let Some(src) = self.sources[source].as_mut() else {
            return Ok(());
        };
        match src.next_feature()? {
            Some(feature) => self.heap.push(Reverse(HeapEntry { feature, source })),
            None => {
                if let Some(Source::Chunk { chunk, .. }) = self.sources[source].take() {
                    debug!(target: "tilepress::sort", chunk = chunk.chunk_number, "Chunk drained");
                    if let Err(e) = chunk.delete() {
                        warn!(
                            target: "tilepress::sort",
                            path = %chunk.path.display(),
                            error = %e,
                            "Failed to delete drained chunk"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of sources not yet drained (chunks plus the residual buffer).
    pub fn live_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }
}

impl Iterator for SortedFeatures {
    type Item = SortResult<EncodedFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.pending_error.take() {
            self.done = true;
            return Some(Err(e));
        }

        let Some(Reverse(entry)) = self.heap.pop() else {
            self.done = true;
            return None;
        };

        // Refill from the same source before handing the feature out; a
        // read failure surfaces on the following call.
        if let Err(e) = self.advance(entry.source) {
            self.pending_error = Some(e);
        }
        Some(Ok(entry.feature))
    }
}

impl Drop for SortedFeatures {
    fn drop(&mut self) {
        for source in self.sources.drain(..).flatten() {
            if let Source::Chunk { reader, chunk } = source {
                drop(reader);
                let _ = chunk.delete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNK_HEADER_SIZE;
    use crate::config::SorterConfig;
    use std::fs;
    use tempfile::TempDir;

    fn write_chunk(dir: &TempDir, number: u64, keys: &[u64], tag: u8) -> SpillChunk {
        let features: Vec<_> = keys
            .iter()
            .map(|k| EncodedFeature::from_raw(*k, vec![tag]))
            .collect();
        SpillChunk::write(dir.path(), number, &features, &SorterConfig::default()).unwrap()
    }

    #[test]
    fn test_merge_interleaves_sources() {
        let dir = TempDir::new().unwrap();
        let a = write_chunk(&dir, 0, &[1, 4, 7], 0);
        let b = write_chunk(&dir, 1, &[2, 5, 8], 1);
        let residual = vec![
            EncodedFeature::from_raw(3, vec![2]),
            EncodedFeature::from_raw(6, vec![2]),
        ];

        let merged = SortedFeatures::open(vec![a, b], residual).unwrap();
        let keys: Vec<_> = merged.map(|f| f.unwrap().sort_key).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_ties_follow_source_order() {
        let dir = TempDir::new().unwrap();
        let a = write_chunk(&dir, 0, &[9, 9], 0);
        let b = write_chunk(&dir, 1, &[9], 1);
        let residual = vec![EncodedFeature::from_raw(9, vec![2])];

        let merged = SortedFeatures::open(vec![a, b], residual).unwrap();
        let tags: Vec<_> = merged.map(|f| f.unwrap().payload[0]).collect();
        assert_eq!(tags, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_drained_chunk_deleted_early() {
        let dir = TempDir::new().unwrap();
        let short = write_chunk(&dir, 0, &[1], 0);
        let long = write_chunk(&dir, 1, &[2, 3, 4], 1);
        let short_path = short.path.clone();
        let long_path = long.path.clone();

        let mut merged = SortedFeatures::open(vec![short, long], Vec::new()).unwrap();
        assert_eq!(merged.next().unwrap().unwrap().sort_key, 1);
        assert!(!short_path.exists());
        assert!(long_path.exists());

        drop(merged);
        assert!(!long_path.exists());
    }

    #[test]
    fn test_corrupt_chunk_yields_error_once() {
        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(&dir, 0, &[1, 2, 3], 0);

        // Corrupt the payload of the second record (record = 8 + 4 + 1 + 4 bytes)
        let mut bytes = fs::read(&chunk.path).unwrap();
        bytes[CHUNK_HEADER_SIZE + 17 + 12] ^= 0xFF;
        fs::write(&chunk.path, &bytes).unwrap();

        let results: Vec<_> = SortedFeatures::open(vec![chunk], Vec::new())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().sort_key, 1);
        assert!(matches!(results[1], Err(SortError::Corruption(_))));
    }

    #[test]
    fn test_unreadable_chunk_fails_open_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let good = write_chunk(&dir, 0, &[1], 0);
        let bad = write_chunk(&dir, 1, &[2], 0);
        let after = write_chunk(&dir, 2, &[3], 0);
        fs::write(&bad.path, b"garbage").unwrap();

        let paths = [good.path.clone(), bad.path.clone(), after.path.clone()];
        assert!(SortedFeatures::open(vec![good, bad, after], Vec::new()).is_err());
        for path in paths {
            assert!(!path.exists());
        }
    }
}
