//! Connection Worker
//!
//! Serves exactly one request per connection, then closes it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::metrics::ServerMetrics;
use crate::access_log::AccessLog;
use crate::cache::{PageCache, ResourceKey, ResourceLoader};
use crate::error::{Error, Result};
use crate::http::{ContentClass, MimeTable, Request, Response, Status, REQUEST_BUFFER_SIZE};

/// Everything a worker needs, shared by all connections
pub struct WorkerContext {
    pub cache: Arc<PageCache>,
    pub image_loader: Arc<dyn ResourceLoader>,
    pub image_root: PathBuf,
    pub mime: MimeTable,
    pub index: String,
    pub access_log: Arc<dyn AccessLog>,
    pub request_timeout: Duration,
    pub metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("cache", &self.cache)
            .field("image_root", &self.image_root)
            .field("index", &self.index)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// What happened to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A response was written
    Served {
        key: String,
        class: ContentClass,
        status: Status,
    },
    /// Closed without a response (empty, garbled, or timed-out request)
    Dropped,
}

/// Serve one connection and log how it went
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: Arc<WorkerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(%peer, "Worker started");
    match serve_connection(stream, peer, &ctx).await {
        Ok(Outcome::Served { key, class, status }) => {
            info!(%peer, key = %key, class = %class, status = status.code(), "Request served");
        }
        Ok(Outcome::Dropped) => debug!(%peer, "Connection closed without a request"),
        Err(e) => warn!(%peer, error = %e, "Connection failed"),
    }
}

/// Read one request, write one response, close.
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    ctx: &WorkerContext,
) -> Result<Outcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; REQUEST_BUFFER_SIZE];
    let n = match tokio::time::timeout(ctx.request_timeout, stream.read(&mut buf)).await {
        Ok(read) => read?,
        Err(_) => {
            debug!(%peer, timeout = ?ctx.request_timeout, "Timed out waiting for request");
            return Ok(Outcome::Dropped);
        }
    };
    if n == 0 {
        return Ok(Outcome::Dropped);
    }

    let Some(request) = Request::parse(&buf[..n]) else {
        debug!(%peer, "Unparseable request line");
        return Ok(Outcome::Dropped);
    };

    // Every later step uses this normalized key
    let target = request.resource_key(&ctx.index);
    let resolved = ResourceKey::normalize(&target);
    let key = match &resolved {
        Ok(key) => key.as_str().to_string(),
        Err(_) => target,
    };
    let kind = ctx.mime.lookup(&key);
    debug!(%peer, method = %request.method, target = %request.target, key = %key, class = %kind.class, "Request received");

    let fetched = match resolved {
        Ok(resource) => match kind.class {
            ContentClass::Image => load_image(ctx, resource).await,
            ContentClass::Page => fetch_page(ctx, resource).await,
        },
        Err(e) => Err(e),
    };

    let response = match fetched {
        Ok(body) => Response::ok(kind.content_type, body),
        Err(e) => {
            if e.is_not_found() {
                debug!(%peer, key = %key, error = %e, "Resource not found");
            } else {
                warn!(%peer, key = %key, error = %e, "Failed to fetch resource");
            }
            Response::not_found()
        }
    };

    response.write_to(&mut stream).await?;
    // Best effort; the response is already flushed
    let _ = stream.shutdown().await;
    drop(stream);

    let status = response.status();
    ctx.metrics.record_response(kind.class, status);

    if kind.class == ContentClass::Page && status == Status::Ok {
        if let Err(e) = ctx.access_log.record(peer, &key).await {
            warn!(%peer, key = %key, error = %e, "Access log write failed");
        }
        log_cache_state(&ctx.cache);
    }

    Ok(Outcome::Served {
        key,
        class: kind.class,
        status,
    })
}

/// Page-class content goes through the cache on the blocking pool
async fn fetch_page(ctx: &WorkerContext, key: ResourceKey) -> Result<Bytes> {
    let cache = Arc::clone(&ctx.cache);
    tokio::task::spawn_blocking(move || cache.get(key.as_str()))
        .await
        .map_err(|e| Error::Internal(format!("page fetch task failed: {}", e)))?
}

/// Image-class content is read fresh and owned by this worker
async fn load_image(ctx: &WorkerContext, key: ResourceKey) -> Result<Bytes> {
    let loader = Arc::clone(&ctx.image_loader);
    let root = ctx.image_root.clone();
    let data = tokio::task::spawn_blocking(move || loader.load(&root, &key))
        .await
        .map_err(|e| Error::Internal(format!("image load task failed: {}", e)))??;
    debug!(size = data.len(), "Image served from disk, bypassing cache");
    Ok(data)
}

fn log_cache_state(cache: &PageCache) {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let snapshot = cache.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_else(|_| format!("{:?}", snapshot));
        debug!(entries = snapshot.len(), state = %json, "Page cache state");
    }
}

// =============================================================================
// Tests
// =============================================================================
