//! Durable storage for cache snapshots
//!
//! Storage is byte-oriented and addressed by relative file names. Missing and
//! unreadable snapshots are reported distinctly from other I/O failures.
//! Writes replace the target atomically (temp file, fsync, rename) so a crash
//! mid-write never leaves a partial snapshot behind.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::errors::StorageError;

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Named-file storage used by the contact caches
pub trait CacheStorage: Send + Sync + fmt::Debug {
    /// Read a snapshot's bytes
    fn read(&self, name: &Path) -> Result<Vec<u8>, StorageError>;

    /// Atomically replace a snapshot, creating it (and its parents) if absent
    fn write(&self, name: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Check whether a snapshot exists
    fn exists(&self, name: &Path) -> bool;

    /// Human-readable location of a snapshot, for logs
    fn location(&self, name: &Path) -> PathBuf {
        name.to_path_buf()
    }
}

// ----------------------------------------------------------------------------
// File System Storage
// ----------------------------------------------------------------------------

/// Storage rooted at a directory on the local file system
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &Path) -> PathBuf {
        self.root.join(name)
    }

    fn temp_path(path: &Path) -> Result<PathBuf, StorageError> {
        let file_name = path.file_name().ok_or_else(|| {
            StorageError::io(
                path,
                std::io::Error::new(ErrorKind::InvalidInput, "Path has no file name"),
            )
        })?;
        let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
        Ok(path.with_file_name(tmp_name))
    }
}

impl CacheStorage for FileStorage {
    fn read(&self, name: &Path) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(name);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound { path: path.clone() },
            ErrorKind::InvalidData => StorageError::corrupt(&path, e.to_string()),
            _ => StorageError::io(&path, e),
        })
    }

    fn write(&self, name: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(name);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }

        let tmp_path = Self::temp_path(&path)?;
        let mut tmp_file = File::create(&tmp_path).map_err(|e| StorageError::io(&tmp_path, e))?;
        tmp_file
            .write_all(bytes)
            .and_then(|_| tmp_file.sync_all())
            .map_err(|e| StorageError::io(&tmp_path, e))?;
        drop(tmp_file);

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::io(&path, e)
        })
    }

    fn exists(&self, name: &Path) -> bool {
        self.resolve(name).is_file()
    }

    fn location(&self, name: &Path) -> PathBuf {
        self.resolve(name)
    }
}

// ----------------------------------------------------------------------------
// Memory Storage Implementation
// ----------------------------------------------------------------------------

/// In-memory storage implementation for testing
#[derive(Debug)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate the backing device failing (or recovering)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Names of all stored snapshots
    pub fn names(&self) -> Vec<PathBuf> {
        self.data().keys().cloned().collect()
    }

    /// Place raw bytes without counting a write
    pub fn insert_raw<P: Into<PathBuf>>(&self, name: P, bytes: Vec<u8>) {
        self.data().insert(name.into(), bytes);
    }

    fn data(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self, name: &Path) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::io(
                name,
                std::io::Error::new(ErrorKind::Other, "Storage not available"),
            ))
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStorage for MemoryStorage {
    fn read(&self, name: &Path) -> Result<Vec<u8>, StorageError> {
        self.check_available(name)?;
        self.data()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                path: name.to_path_buf(),
            })
    }

    fn write(&self, name: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_available(name)?;
        self.data().insert(name.to_path_buf(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exists(&self, name: &Path) -> bool {
        self.data().contains_key(name)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
