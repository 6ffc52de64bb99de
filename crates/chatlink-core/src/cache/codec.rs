//! Snapshot encoding and typed snapshot files
//!
//! Snapshots are JSON documents carrying a format version marker. A blank
//! file counts as absent; a snapshot with a different version counts as
//! unreadable. Unknown fields are ignored so newer writers stay loadable.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::errors::{CacheError, CacheResult, StorageError};
use crate::storage::CacheStorage;

/// Current on-disk format of every cache snapshot
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ----------------------------------------------------------------------------
// Snapshot Trait
// ----------------------------------------------------------------------------

/// A cache structure that can be persisted as a snapshot
pub trait Snapshot: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Format version recorded in this snapshot
    fn version(&self) -> u32;
}

/// Encode a snapshot as pretty-printed JSON
pub fn encode<T: Snapshot>(snapshot: &T) -> CacheResult<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot).map_err(CacheError::Encode)
}

/// Decode a snapshot, returning `None` for blank input
pub fn decode<T: Snapshot>(bytes: &[u8]) -> CacheResult<Option<T>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let snapshot: T = serde_json::from_slice(bytes).map_err(CacheError::Decode)?;
    if snapshot.version() != CACHE_FORMAT_VERSION {
        return Err(CacheError::UnsupportedVersion {
            expected: CACHE_FORMAT_VERSION,
            found: snapshot.version(),
        });
    }
    Ok(Some(snapshot))
}

// ----------------------------------------------------------------------------
// Snapshot File
// ----------------------------------------------------------------------------

/// Handle to one snapshot of type `T` in a [`CacheStorage`]
///
/// Clones share a write lock, so the file has a single writer at a time.
pub struct SnapshotFile<T> {
    storage: Arc<dyn CacheStorage>,
    name: PathBuf,
    write_lock: Arc<Mutex<()>>,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T> Clone for SnapshotFile<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            name: self.name.clone(),
            write_lock: self.write_lock.clone(),
            _snapshot: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SnapshotFile<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFile")
            .field("location", &self.storage.location(&self.name))
            .finish()
    }
}

impl<T: Snapshot> SnapshotFile<T> {
    pub fn new<P: Into<PathBuf>>(storage: Arc<dyn CacheStorage>, name: P) -> Self {
        Self {
            storage,
            name: name.into(),
            write_lock: Arc::new(Mutex::new(())),
            _snapshot: PhantomData,
        }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn location(&self) -> PathBuf {
        self.storage.location(&self.name)
    }

    pub fn exists(&self) -> bool {
        self.storage.exists(&self.name)
    }

    /// Read and decode the snapshot (blocking)
    ///
    /// `Ok(None)` means the snapshot is absent or blank.
    pub fn load_blocking(&self) -> CacheResult<Option<T>> {
        match self.storage.read(&self.name) {
            Ok(bytes) => decode(&bytes),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the snapshot, falling back to an empty cache on any failure (blocking)
    pub fn load_or_default_blocking(&self) -> T {
        match self.load_blocking() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No cache snapshot at {}, starting empty", self.location().display());
                T::default()
            }
            Err(e) if e.is_expected_on_load() => {
                warn!(
                    "Ignoring unreadable cache snapshot at {}: {}",
                    self.location().display(),
                    e
                );
                T::default()
            }
            Err(e) => {
                warn!(
                    "Failed to read cache snapshot at {}, starting empty: {}",
                    self.location().display(),
                    e
                );
                T::default()
            }
        }
    }

    /// Encode and atomically write the snapshot (blocking)
    pub fn save_blocking(&self, snapshot: &T) -> CacheResult<()> {
        let bytes = encode(snapshot)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.storage.write(&self.name, &bytes)?;
        Ok(())
    }

    /// Load on the blocking-I/O pool, falling back to an empty cache
    pub async fn load_or_default(&self) -> T {
        let file = self.clone();
        match tokio::task::spawn_blocking(move || file.load_or_default_blocking()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Cache load task for {} failed, starting empty: {}",
                    self.location().display(),
                    e
                );
                T::default()
            }
        }
    }

    /// Save on the blocking-I/O pool
    pub async fn save(&self, snapshot: T) -> CacheResult<()> {
        let file = self.clone();
        tokio::task::spawn_blocking(move || file.save_blocking(&snapshot))
            .await
            .map_err(|e| CacheError::Background {
                reason: e.to_string(),
            })?
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
