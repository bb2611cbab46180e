//! Content Type Table
//!
//! One declarative suffix table drives both the cache-bypass classifier and
//! the `Content-Type` header.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Fallback for unknown suffixes
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Suffixes served fresh from the image root by default
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
];

/// How a resource is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    /// Served through the page cache from the page root
    Page,
    /// Loaded fresh from the image root, never cached
    Image,
}

impl ContentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentClass::Page => "page",
            ContentClass::Image => "image",
        }
    }
}

impl std::fmt::Display for ContentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suffix lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentKind {
    pub content_type: &'static str,
    pub class: ContentClass,
}

/// Suffix to content type and class mapping
#[derive(Debug, Clone)]
pub struct MimeTable {
    types: HashMap<&'static str, &'static str>,
    image_extensions: HashSet<String>,
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::with_image_extensions(DEFAULT_IMAGE_EXTENSIONS.iter().copied())
    }
}

impl MimeTable {
    /// Build the table with a custom cache-bypass suffix set.
    ///
    /// Suffixes are matched case-insensitively, a leading dot is ignored.
    pub fn with_image_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            types: CONTENT_TYPES.iter().copied().collect(),
            image_extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Look up a resource key by its suffix
    pub fn lookup(&self, key: &str) -> ContentKind {
        let ext = suffix(key).map(|s| s.to_ascii_lowercase());

        let content_type = ext
            .as_deref()
            .and_then(|e| self.types.get(e).copied())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let class = match ext {
            Some(e) if self.image_extensions.contains(&e) => ContentClass::Image,
            _ => ContentClass::Page,
        };

        ContentKind {
            content_type,
            class,
        }
    }

    pub fn content_type(&self, key: &str) -> &'static str {
        self.lookup(key).content_type
    }

    pub fn classify(&self, key: &str) -> ContentClass {
        self.lookup(key).class
    }

    /// Configured cache-bypass suffixes, sorted
    pub fn image_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.image_extensions.iter().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

fn suffix(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}
