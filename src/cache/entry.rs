//! Cache Entry Types
//!
//! Resource keys and the slot entries held by the page cache.

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Normalized, filename-only resource name.
///
/// Every lookup goes through [`ResourceKey::normalize`] so that `/index.html`,
/// `index.html` and `docs/index.html` all collide on the same entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Strip leading separators and any directory prefix.
    pub fn normalize(raw: &str) -> Result<Self> {
        let name = raw.rsplit(['/', '\\']).next().unwrap_or_default();

        if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
            return Err(Error::InvalidKey(raw.to_string()));
        }

        Ok(Self(name.to_string()))
    }

    /// Get the key as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File suffix after the last dot, if any
    pub fn extension(&self) -> Option<&str> {
        match self.0.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&ResourceKey> for String {
    fn from(key: &ResourceKey) -> Self {
        key.0.clone()
    }
}

/// One occupied slot of the page cache.
///
/// `size` always equals `data.len()`; the entry owns its buffer and hands out
/// cheap reference-counted views of it.
#[derive(Clone)]
pub struct CacheEntry {
    key: ResourceKey,
    data: Bytes,
    size: u64,
    last_access: u64,
}

impl CacheEntry {
    /// Create a new entry stamped with `now`
    pub fn new(key: ResourceKey, data: Bytes, now: u64) -> Self {
        let size = data.len() as u64;
        Self {
            key,
            data,
            size,
            last_access: now,
        }
    }

    #[inline]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Get data (zero-copy)
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn last_access(&self) -> u64 {
        self.last_access
    }

    /// Record an access at logical time `now`
    #[inline]
    pub fn touch(&mut self, now: u64) {
        self.last_access = now;
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key.as_str())
            .field("size", &self.size)
            .field("last_access", &self.last_access)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_normalize_strips_leading_separator() {
        let a = ResourceKey::normalize("/index.html").unwrap();
        let b = ResourceKey::normalize("index.html").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "index.html");
    }

    #[test]
    fn test_normalize_strips_directories() {
        let key = ResourceKey::normalize("/static/css/site.css").unwrap();
        assert_eq!(key.as_str(), "site.css");

        let key = ResourceKey::normalize("imagenes/photo.jpg").unwrap();
        assert_eq!(key.as_str(), "photo.jpg");

        let key = ResourceKey::normalize("..\\secret.txt").unwrap();
        assert_eq!(key.as_str(), "secret.txt");
    }

    #[test]
    fn test_normalize_rejects_empty_and_parent() {
        assert_matches!(ResourceKey::normalize("/"), Err(Error::InvalidKey(_)));
        assert_matches!(ResourceKey::normalize(""), Err(Error::InvalidKey(_)));
        assert_matches!(ResourceKey::normalize("/a/.."), Err(Error::InvalidKey(_)));
        assert_matches!(ResourceKey::normalize("dir/."), Err(Error::InvalidKey(_)));
    }

    #[test]
    fn test_normalize_keeps_whitespace() {
        let key = ResourceKey::normalize("/photo.jpg ").unwrap();
        assert_eq!(key.as_str(), "photo.jpg ");
        assert_eq!(key.extension(), Some("jpg "));
        assert_ne!(key, ResourceKey::normalize("photo.jpg").unwrap());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = ResourceKey::normalize("/docs/a b.html").unwrap();
        let twice = ResourceKey::normalize(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_extension() {
        let key = ResourceKey::normalize("photo.JPG").unwrap();
        assert_eq!(key.extension(), Some("JPG"));

        let key = ResourceKey::normalize("archive.tar.gz").unwrap();
        assert_eq!(key.extension(), Some("gz"));

        assert_eq!(ResourceKey::normalize("README").unwrap().extension(), None);
        assert_eq!(ResourceKey::normalize(".bashrc").unwrap().extension(), None);
        assert_eq!(ResourceKey::normalize("trailing.").unwrap().extension(), None);
    }

    #[test]
    fn test_entry_size_matches_data() {
        let key = ResourceKey::normalize("a.html").unwrap();
        let entry = CacheEntry::new(key, Bytes::from_static(b"<h1>hi</h1>"), 7);

        assert_eq!(entry.size(), 11);
        assert_eq!(entry.size(), entry.data().len() as u64);
        assert_eq!(entry.last_access(), 7);
    }

    #[test]
    fn test_entry_touch() {
        let key = ResourceKey::normalize("a.html").unwrap();
        let mut entry = CacheEntry::new(key, Bytes::from_static(b"x"), 1);
        entry.touch(42);
        assert_eq!(entry.last_access(), 42);
    }

    #[test]
    fn test_entry_debug() {
        let key = ResourceKey::normalize("a.html").unwrap();
        let entry = CacheEntry::new(key, Bytes::from_static(b"x"), 1);
        let debug = format!("{:?}", entry);
        assert!(debug.contains("CacheEntry"));
        assert!(debug.contains("a.html"));
    }
}
