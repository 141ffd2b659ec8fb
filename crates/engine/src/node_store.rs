//! File-backed node location table
//!
//! Multi-pass sources record `id → packed location` pairs in one pass and
//! look them up in the next. Ids must arrive in ascending order, which keeps
//! the file sorted so lookups are a binary search over a memory map.
//!
//! ## Record Layout
//!
//! ```text
//! ┌──────────────┬──────────────┐
//! │ id (u64 LE)  │ value (u64)  │   repeated, ascending by id
//! └──────────────┴──────────────┘
//! ```

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const RECORD_SIZE: usize = 16;

/// Node store errors
#[derive(Debug, Error)]
pub enum NodeStoreError {
    /// IO error on the backing file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// `put` with an id not above the previous one
    #[error("Node ids must be strictly ascending: {current} after {previous}")]
    NotAscending {
        /// Previous id
        previous: u64,
        /// Rejected id
        current: u64,
    },

    /// `put` after `seal`
    #[error("Node store is sealed; no further puts")]
    Sealed,

    /// `get` before `seal`
    #[error("Node store is not sealed yet; lookups need a sealed store")]
    NotSealed,
}

enum StoreState {
    Writing {
        out: BufWriter<File>,
        last_id: Option<u64>,
    },
    Sealed {
        // None for an empty store; zero-length files cannot be mapped
        map: Option<Mmap>,
    },
}

/// Append-then-lookup table of `u64 → u64`, bound to one file.
pub struct NodeLocationStore {
    path: PathBuf,
    state: RwLock<StoreState>,
    count: RwLock<u64>,
}

impl std::fmt::Debug for NodeLocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLocationStore")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

impl NodeLocationStore {
    /// Create the store file at `path`, which must not exist.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, NodeStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        debug!(target: "tilepress::nodes", path = %path.display(), "Node store created");
        Ok(NodeLocationStore {
            path,
            state: RwLock::new(StoreState::Writing {
                out: BufWriter::new(file),
                last_id: None,
            }),
            count: RwLock::new(0),
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries stored.
    pub fn len(&self) -> u64 {
        *self.count.read()
    }

    /// Whether nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `value` for `id`. Ids must be strictly ascending.
    pub fn put(&self, id: u64, value: u64) -> Result<(), NodeStoreError> {
        let mut state = self.state.write();
        match &mut *state {
            StoreState::Sealed { .. } => Err(NodeStoreError::Sealed),
            StoreState::Writing { out, last_id } => {
                if let Some(previous) = *last_id {
                    if id <= previous {
                        return Err(NodeStoreError::NotAscending {
                            previous,
                            current: id,
                        });
                    }
                }
                out.write_u64::<LittleEndian>(id)?;
                out.write_u64::<LittleEndian>(value)?;
                *last_id = Some(id);
                *self.count.write() += 1;
                Ok(())
            }
        }
    }

    /// Finish writing and make the store readable. Idempotent.
    pub fn seal(&self) -> Result<(), NodeStoreError> {
        let mut state = self.state.write();
        if let StoreState::Writing { out, .. } = &mut *state {
            out.flush()?;
            out.get_ref().sync_all()?;

            let map = if self.len() == 0 {
                None
            } else {
                let file = File::open(&self.path)?;
                // The file is private to this store and never written again
                Some(unsafe { Mmap::map(&file)? })
            };
            *state = StoreState::Sealed { map };
            debug!(target: "tilepress::nodes", entries = self.len(), "Node store sealed");
        }
        Ok(())
    }

    /// Value stored for `id`, if any.
    pub fn get(&self, id: u64) -> Result<Option<u64>, NodeStoreError> {
        let state = self.state.read();
        let map = match &*state {
            StoreState::Writing { .. } => return Err(NodeStoreError::NotSealed),
            StoreState::Sealed { map: None } => return Ok(None),
            StoreState::Sealed { map: Some(map) } => map,
        };

        let record = |i: usize| -> (u64, u64) {
            let bytes = &map[i * RECORD_SIZE..(i + 1) * RECORD_SIZE];
            let mut id = [0u8; 8];
            let mut value = [0u8; 8];
            id.copy_from_slice(&bytes[..8]);
            value.copy_from_slice(&bytes[8..]);
            (u64::from_le_bytes(id), u64::from_le_bytes(value))
        };

        let (mut lo, mut hi) = (0usize, map.len() / RECORD_SIZE);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (mid_id, value) = record(mid);
            match mid_id.cmp(&id) {
                std::cmp::Ordering::Equal => return Ok(Some(value)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }

    /// Release the map and delete the backing file.
    pub fn delete(self) -> Result<(), NodeStoreError> {
        *self.state.write() = StoreState::Sealed { map: None };
        fs::remove_file(&self.path)?;
        debug!(target: "tilepress::nodes", path = %self.path.display(), "Node store deleted");
        Ok(())
    }
}

impl Drop for NodeLocationStore {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_seal_get() {
        let dir = TempDir::new().unwrap();
        let store = NodeLocationStore::create(dir.path().join("node.db")).unwrap();
        for id in (1..1000u64).step_by(3) {
            store.put(id, id * 10).unwrap();
        }
        store.seal().unwrap();

        assert_eq!(store.get(1).unwrap(), Some(10));
        assert_eq!(store.get(997).unwrap(), Some(9970));
        assert_eq!(store.get(2).unwrap(), None);
        assert_eq!(store.get(5000).unwrap(), None);
        assert_eq!(store.len(), 333);
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = NodeLocationStore::create(dir.path().join("node.db")).unwrap();
        store.seal().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get(1).unwrap(), None);
    }

    #[test]
    fn test_ordering_and_state_enforced() {
        let dir = TempDir::new().unwrap();
        let store = NodeLocationStore::create(dir.path().join("node.db")).unwrap();
        store.put(5, 1).unwrap();
        assert!(matches!(
            store.put(5, 2),
            Err(NodeStoreError::NotAscending { previous: 5, current: 5 })
        ));
        assert!(matches!(store.get(5), Err(NodeStoreError::NotSealed)));

        store.seal().unwrap();
        store.seal().unwrap();
        assert!(matches!(store.put(6, 1), Err(NodeStoreError::Sealed)));
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.db");
        let store = NodeLocationStore::create(&path).unwrap();
        store.put(1, 1).unwrap();
        store.seal().unwrap();
        assert!(path.exists());

        store.delete().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node.db");
        fs::write(&path, b"").unwrap();
        assert!(matches!(
            NodeLocationStore::create(&path),
            Err(NodeStoreError::Io(_))
        ));
    }
}
