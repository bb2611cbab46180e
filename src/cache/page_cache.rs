//! Page Cache - Bounded LRU Table
//!
//! A fixed number of slots holding loaded pages, guarded by one exclusive lock.
//!
//! # Design
//!
//! - Lookup, load-on-miss and eviction run as one critical section, so two
//!   concurrent `get` calls can never interleave their effects on the table
//! - Recency is a logical clock advanced on every successful fetch, so
//!   `last_access` values are strictly increasing
//! - Eviction is a linear scan for the smallest `last_access`; ties go to
//!   the lowest slot index
//! - The only blocking work inside the lock is a local disk read

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, ResourceKey};
use super::loader::ResourceLoader;
use super::metrics::{CacheMetrics, CacheStats};
use crate::error::{Error, Result};

/// Page cache configuration
#[derive(Debug, Clone)]
pub struct PageCacheConfig {
    /// Maximum number of entries (must be positive)
    pub capacity: usize,
    /// Directory that resource keys resolve against
    pub root: PathBuf,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            capacity: super::DEFAULT_CAPACITY,
            root: PathBuf::from(super::DEFAULT_PAGE_ROOT),
        }
    }
}

/// One row of [`PageCache::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub key: String,
    pub last_access: u64,
    pub size: u64,
}

struct Slots {
    entries: Vec<CacheEntry>,
    clock: u64,
    closed: bool,
}

impl Slots {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn position(&self, key: &ResourceKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    /// Slot holding the least recently used entry, first one wins on ties
    fn lru_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_access())
            .map(|(idx, _)| idx)
    }
}

/// Bounded page cache with LRU replacement
pub struct PageCache {
    slots: Mutex<Slots>,
    capacity: usize,
    root: PathBuf,
    loader: Arc<dyn ResourceLoader>,
    metrics: CacheMetrics,
}

impl PageCache {
    /// Create an empty cache. Fails if `capacity` is zero.
    pub fn new(config: PageCacheConfig, loader: Arc<dyn ResourceLoader>) -> Result<Self> {
        if config.capacity == 0 {
            return Err(Error::Config("page cache capacity must be positive".into()));
        }

        Ok(Self {
            slots: Mutex::new(Slots {
                entries: Vec::with_capacity(config.capacity),
                clock: 0,
                closed: false,
            }),
            capacity: config.capacity,
            root: config.root,
            loader,
            metrics: CacheMetrics::new(),
        })
    }

    /// Fetch a page, loading it from the page root on a miss.
    ///
    /// The returned buffer is an immutable view of the cached bytes.
    pub fn get(&self, raw_key: &str) -> Result<Bytes> {
        let key = ResourceKey::normalize(raw_key)?;

        let mut slots = self.slots.lock();
        if slots.closed {
            return Err(Error::CacheClosed);
        }

        if let Some(idx) = slots.position(&key) {
            let now = slots.tick();
            let entry = &mut slots.entries[idx];
            entry.touch(now);
            self.metrics.record_hit();
            debug!(key = %key, slot = idx, last_access = now, "Page cache hit");
            return Ok(entry.data().clone());
        }

        self.metrics.record_miss();
        debug!(key = %key, "Page cache miss, loading from disk");

        let data = match self.loader.load(&self.root, &key) {
            Ok(data) => data,
            Err(e) => {
                self.metrics.record_load_failure();
                debug!(key = %key, error = %e, "Page load failed");
                return Err(e);
            }
        };

        let now = slots.tick();
        let entry = CacheEntry::new(key, data.clone(), now);

        if slots.entries.len() < self.capacity {
            debug!(key = %entry.key(), slot = slots.entries.len(), "Page added to cache");
            slots.entries.push(entry);
        } else if let Some(idx) = slots.lru_index() {
            let evicted = std::mem::replace(&mut slots.entries[idx], entry);
            self.metrics.record_eviction();
            debug!(
                evicted = %evicted.key(),
                admitted = %slots.entries[idx].key(),
                slot = idx,
                "Page cache full, replaced least recently used page"
            );
        }

        Ok(data)
    }

    /// Insert a page without going through the loader.
    ///
    /// Meant for pre-population before traffic starts. Returns `false` when
    /// the cache is full, closed, or already holds the key.
    pub fn put_initial(&self, raw_key: &str, data: Bytes) -> Result<bool> {
        let key = ResourceKey::normalize(raw_key)?;

        let mut slots = self.slots.lock();
        if slots.closed || slots.entries.len() >= self.capacity || slots.position(&key).is_some()
        {
            return Ok(false);
        }

        let now = slots.tick();
        slots.entries.push(CacheEntry::new(key, data, now));
        Ok(true)
    }

    /// Pre-populate from the page root, in file name order, until full.
    ///
    /// Best-effort: unreadable files are skipped and a missing root leaves
    /// the cache empty. Returns the number of pages loaded.
    pub fn preload(&self) -> usize {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Cannot open page root for preload");
                return 0;
            }
        };

        let mut names: Vec<String> = dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut loaded = 0;
        for name in names {
            if self.len() >= self.capacity {
                break;
            }

            let Ok(key) = ResourceKey::normalize(&name) else {
                continue;
            };

            match self.loader.load(&self.root, &key) {
                Ok(data) => {
                    if let Ok(true) = self.put_initial(key.as_str(), data) {
                        debug!(key = %key, "Preloaded page");
                        loaded += 1;
                    }
                }
                Err(e) => debug!(key = %key, error = %e, "Skipping unreadable page"),
            }
        }

        info!(loaded, capacity = self.capacity, "Page cache preloaded");
        loaded
    }

    /// Keys and recency stamps in slot order
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .lock()
            .entries
            .iter()
            .map(|e| SlotSnapshot {
                key: e.key().as_str().to_string(),
                last_access: e.last_access(),
                size: e.size(),
            })
            .collect()
    }

    /// Release every entry and refuse further lookups.
    ///
    /// Calling it again is a no-op. Returns the number of entries released.
    pub fn shutdown(&self) -> usize {
        let mut slots = self.slots.lock();
        let released = slots.entries.len();
        slots.entries.clear();
        slots.entries.shrink_to_fit();
        if !slots.closed {
            slots.closed = true;
            info!(released, "Page cache released");
        }
        released
    }

    /// Whether the key is currently cached, without touching recency
    pub fn contains(&self, raw_key: &str) -> bool {
        match ResourceKey::normalize(raw_key) {
            Ok(key) => self.slots.lock().position(&key).is_some(),
            Err(_) => false,
        }
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Page root the loader reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (entries, size_bytes) = {
            let slots = self.slots.lock();
            (
                slots.entries.len(),
                slots.entries.iter().map(CacheEntry::size).sum::<u64>(),
            )
        };

        CacheStats {
            capacity: self.capacity,
            entries,
            size_bytes,
            hits: self.metrics.hits(),
            misses: self.metrics.misses(),
            evictions: self.metrics.evictions(),
            load_failures: self.metrics.load_failures(),
            hit_ratio: self.metrics.hit_ratio(),
        }
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("capacity", &self.capacity)
            .field("root", &self.root)
            .field("entries", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
