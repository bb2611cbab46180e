//! Page Cache
//!
//! In-memory cache of small page assets with bounded capacity and
//! least-recently-used replacement.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          PageCache                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Mutex<Slots>                                                │
//! │  ┌──────────┬──────────┬──────────┐                          │
//! │  │ slot 0   │ slot 1   │ slot 2   │  ... capacity            │
//! │  │ key,t=7  │ key,t=3  │ key,t=9  │                          │
//! │  └──────────┴──────────┴──────────┘                          │
//! │         │ miss                                               │
//! │         ▼                                                    │
//! │  ResourceLoader (page root)                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Capacity is small, so the table is a plain vector of slots and eviction
//! is an `O(capacity)` scan rather than an ordered structure.

mod entry;
mod loader;
mod metrics;
mod page_cache;

pub use entry::{CacheEntry, ResourceKey};
pub use loader::{FsLoader, InMemoryLoader, ResourceLoader};
pub use metrics::{CacheMetrics, CacheStats};
pub use page_cache::{PageCache, PageCacheConfig, SlotSnapshot};

/// Default number of page slots
pub const DEFAULT_CAPACITY: usize = 3;

/// Default directory for cache-eligible pages
pub const DEFAULT_PAGE_ROOT: &str = "paginas";

/// Default directory for cache-bypassed images
pub const DEFAULT_IMAGE_ROOT: &str = "imagenes";
