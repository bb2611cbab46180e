//! Resource Loader
//!
//! Reads a resource from a content root fully into memory. Loaders hold no
//! shared state; the page cache calls them while holding its lock, and the
//! worker calls them directly for cache-bypassed image assets.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

use super::entry::ResourceKey;
use crate::error::{Error, Result};

/// Loads the bytes behind a resource key from a content root
pub trait ResourceLoader: Send + Sync {
    /// Read `root/key` fully. A short read is a failure, not partial success.
    fn load(&self, root: &Path, key: &ResourceKey) -> Result<Bytes>;
}

/// Filesystem-backed loader
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl FsLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceLoader for FsLoader {
    fn load(&self, root: &Path, key: &ResourceKey) -> Result<Bytes> {
        let path = root.join(key.as_str());

        let mut file = File::open(&path).map_err(|_| Error::not_found(key))?;
        let expected = file
            .metadata()
            .map_err(|_| Error::not_found(key))?
            .len();

        let len = usize::try_from(expected).map_err(|e| Error::AllocationFailed {
            size: expected,
            reason: e.to_string(),
        })?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|e| Error::AllocationFailed {
                size: expected,
                reason: e.to_string(),
            })?;

        file.read_to_end(&mut buf)
            .map_err(|_| Error::not_found(key))?;

        if buf.len() as u64 != expected {
            tracing::warn!(
                path = %path.display(),
                expected,
                read = buf.len(),
                "Short read, treating resource as missing"
            );
            return Err(Error::not_found(key));
        }

        Ok(Bytes::from(buf))
    }
}

/// In-memory loader for testing
///
/// Counts every `load` call so tests can tell hits from misses.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    files: DashMap<PathBuf, Bytes>,
    loads: AtomicU64,
}

impl InMemoryLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` under `root/key`
    pub fn insert(&self, root: impl AsRef<Path>, key: &str, data: impl Into<Bytes>) {
        self.files.insert(root.as_ref().join(key), data.into());
    }

    /// Remove a file, returning whether it existed
    pub fn remove(&self, root: impl AsRef<Path>, key: &str) -> bool {
        self.files.remove(&root.as_ref().join(key)).is_some()
    }

    /// Number of load calls so far, successful or not
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl ResourceLoader for InMemoryLoader {
    fn load(&self, root: &Path, key: &ResourceKey) -> Result<Bytes> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.files
            .get(&root.join(key.as_str()))
            .map(|data| data.value().clone())
            .ok_or_else(|| Error::not_found(key))
    }
}

// =============================================================================
// Tests
// =============================================================================
