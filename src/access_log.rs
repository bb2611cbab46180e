//! Access Log
//!
//! Records one line per successfully served page. Writers report failures
//! through `Result`, and the connection worker only logs them: a broken
//! access log never denies service.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Default access log file
pub const DEFAULT_ACCESS_LOG: &str = "log_conexiones.txt";

/// Sink for page access records
#[async_trait]
pub trait AccessLog: Send + Sync {
    /// Record that `peer` was served `key`
    async fn record(&self, peer: SocketAddr, key: &str) -> Result<()>;
}

/// One access log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub peer: SocketAddr,
    pub key: String,
}

/// Render a log line
pub fn format_record(at: DateTime<Local>, peer: SocketAddr, key: &str) -> String {
    format!(
        "[{}] Connection from {}:{}, page requested: {}\n",
        at.format("%a %b %e %H:%M:%S %Y"),
        peer.ip(),
        peer.port(),
        key
    )
}

/// Appends records to a text file.
///
/// The file is opened in append mode for every record, so it may be rotated
/// or deleted while the server runs.
#[derive(Debug)]
pub struct FileAccessLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAccessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AccessLog for FileAccessLog {
    async fn record(&self, peer: SocketAddr, key: &str) -> Result<()> {
        let line = format_record(Local::now(), peer, key);

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::AccessLog(format!("open {}: {}", self.path.display(), e)))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::AccessLog(format!("write {}: {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| Error::AccessLog(format!("flush {}: {}", self.path.display(), e)))
    }
}

/// In-memory access log for testing.
///
/// Collects records in memory for later inspection during tests.
#[derive(Debug, Default)]
pub struct InMemoryAccessLog {
    records: parking_lot::RwLock<Vec<AccessRecord>>,
}

impl InMemoryAccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected records.
    pub fn records(&self) -> Vec<AccessRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AccessLog for InMemoryAccessLog {
    async fn record(&self, peer: SocketAddr, key: &str) -> Result<()> {
        self.records.write().push(AccessRecord {
            peer,
            key: key.to_string(),
        });
        Ok(())
    }
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAccessLog;

#[async_trait]
impl AccessLog for NullAccessLog {
    async fn record(&self, _peer: SocketAddr, _key: &str) -> Result<()> {
        Ok(())
    }
}
