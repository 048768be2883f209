//! Generic persistent cache index.
//!
//! A [`CacheIndex`] is a `paper_id → record` map, fully loaded into memory at
//! construction and rewritten to disk on every mutation. Two independent
//! instances exist in a running system — one for raw-PDF assets, one for
//! translated assets — sharing only the `paper_id` key space.
//!
//! Durability contract: once a mutating call returns `Ok`, the on-disk file
//! reflects the new state. Persistence writes the whole index to `<path>.tmp`
//! and renames it over `<path>`, so a crash mid-write leaves either the
//! pre-call or the post-call file, never a truncated one.
//!
//! Across independently-running processes the file is read only at [`open`];
//! a single-primary deployment is assumed.
//!
//! [`open`]: CacheIndex::open

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from cache-index persistence.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the index file failed.
    #[error("cache index I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The index file exists but does not parse as the expected JSON shape.
    #[error("cache index {path} is not valid JSON: {source}")]
    Corrupt {
        /// The index file path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// The in-memory index could not be encoded to JSON.
    #[error("cache index {path} could not be encoded: {source}")]
    Encode {
        /// The index file path.
        path: PathBuf,
        /// Underlying encode error.
        source: serde_json::Error,
    },
}

/// A record storable in a [`CacheIndex`].
pub trait CacheRecord: Clone + Serialize + DeserializeOwned + Send + 'static {
    /// Partial-update type; every field optional.
    type Patch;

    /// The index key (paper id).
    fn key(&self) -> &str;

    /// Merge a patch into this record.
    fn apply(&mut self, patch: Self::Patch);
}

/// JSON-backed persistent map with synchronous write-through.
///
/// One coarse mutex guards the in-memory map and the backing file together,
/// so within a process every read observes the latest completed write.
#[derive(Debug)]
pub struct CacheIndex<R: CacheRecord> {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, R>>,
}

impl<R: CacheRecord> CacheIndex<R> {
    /// Open an index, loading the whole backing file into memory.
    ///
    /// A missing file is an empty index. A malformed file is
    /// [`CacheError::Corrupt`] — the caller decides whether to repair or
    /// abort; silently discarding records is not this layer's call.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let map = match std::fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    /// Pure in-memory lookup; never touches disk.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<R> {
        self.inner.lock().get(key).cloned()
    }

    /// Replace the record stored under its key and persist the whole index.
    pub fn upsert(&self, record: R) -> Result<R, CacheError> {
        let mut map = self.inner.lock();
        let _ = map.insert(record.key().to_string(), record.clone());
        self.persist(&map)?;
        Ok(record)
    }

    /// Merge a patch into an existing record and persist.
    ///
    /// Returns `Ok(None)` without touching disk when the key is absent.
    pub fn update(&self, key: &str, patch: R::Patch) -> Result<Option<R>, CacheError> {
        let mut map = self.inner.lock();
        let Some(record) = map.get_mut(key) else {
            return Ok(None);
        };
        record.apply(patch);
        let updated = record.clone();
        self.persist(&map)?;
        Ok(Some(updated))
    }

    /// Number of records currently indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Write the whole index to `<path>.tmp`, then rename over `<path>`.
    fn persist(&self, map: &BTreeMap<String, R>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(map).map_err(|source| CacheError::Encode {
            path: self.path.clone(),
            source,
        })?;
        let tmp = tmp_path(&self.path);
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
