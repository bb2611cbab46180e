//! pagecache-httpd - Minimal Concurrent HTTP File Server
//!
//! Accepts TCP connections, reads one request line, resolves it to a file
//! under a content root and returns the bytes. Small page assets are served
//! through a bounded in-memory cache with least-recently-used replacement;
//! images are always read fresh from their own root. Every served page is
//! appended to an access log.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher → Worker → PageCache (or ResourceLoader) → Response → close
//! ```
//!
//! # Modules
//!
//! - [`access_log`] - Access log writers
//! - [`cache`] - Page cache and resource loaders
//! - [`config`] - Server configuration
//! - [`error`] - Error types
//! - [`http`] - Request parsing, responses and content types
//! - [`server`] - Dispatcher, workers, shutdown and metrics endpoint

pub mod access_log;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod server;

// Re-export commonly used types
pub use access_log::{AccessLog, FileAccessLog, InMemoryAccessLog};
pub use cache::{FsLoader, InMemoryLoader, PageCache, PageCacheConfig, ResourceLoader};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use server::{RunFlag, Server};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
