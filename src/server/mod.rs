//! HTTP file server
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  accept   ┌──────────────┐   get    ┌─────────────┐
//! │ Dispatcher │──────────▶│ Worker (×N)  │─────────▶│  PageCache  │
//! │  (1 task)  │  spawn    │ 1 req / conn │          │ (one lock)  │
//! └────────────┘           └──────────────┘          └─────────────┘
//!       ▲                         │ images                  │ miss
//!       │ RunFlag                 ▼                         ▼
//!  signal task             ResourceLoader (image root)  ResourceLoader
//! ```
//!
//! # Shutdown
//!
//! 1. A signal (or [`RunFlag::stop`]) clears the run-flag
//! 2. The dispatcher leaves its accept loop and drops the listener
//! 3. In-flight workers get up to the grace period to finish
//! 4. The page cache is released

mod dispatcher;
mod metrics;
mod shutdown;
mod worker;

pub use dispatcher::{
    accept_error_action, is_listener_closed, run_dispatcher, AcceptAction, ACCEPT_ERROR_BACKOFF,
};
pub use metrics::{run_metrics_server, ServerMetrics};
pub use shutdown::{stop_on_signal, RunFlag};
pub use worker::{handle_connection, serve_connection, Outcome, WorkerContext};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::access_log::AccessLog;
use crate::cache::{FsLoader, PageCache, PageCacheConfig, ResourceLoader};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::MimeTable;

/// A bound server, ready to run
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<WorkerContext>,
    run_flag: RunFlag,
    tracker: TaskTracker,
    shutdown_grace: Duration,
}

impl Server {
    /// Build the cache and bind the listener, reading content from disk
    pub async fn bind(config: &ServerConfig, access_log: Arc<dyn AccessLog>) -> Result<Self> {
        let loader: Arc<dyn ResourceLoader> = Arc::new(FsLoader::new());
        Self::bind_with_loaders(config, loader.clone(), loader, access_log).await
    }

    /// Same as [`Server::bind`] with explicit page and image loaders
    pub async fn bind_with_loaders(
        config: &ServerConfig,
        page_loader: Arc<dyn ResourceLoader>,
        image_loader: Arc<dyn ResourceLoader>,
        access_log: Arc<dyn AccessLog>,
    ) -> Result<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let cache = PageCache::new(
            PageCacheConfig {
                capacity: config.cache_capacity,
                root: config.page_root.clone(),
            },
            page_loader,
        )?;
        if config.preload {
            cache.preload();
        }

        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let ctx = WorkerContext {
            cache: Arc::new(cache),
            image_loader,
            image_root: config.image_root.clone(),
            mime: MimeTable::with_image_extensions(&config.image_extensions),
            index: config.index.clone(),
            access_log,
            request_timeout: config.request_timeout,
            metrics: Arc::new(ServerMetrics::new()?),
        };

        info!(
            addr = %local_addr,
            page_root = %config.page_root.display(),
            image_root = %config.image_root.display(),
            capacity = config.cache_capacity,
            "Server listening"
        );

        Ok(Self {
            listener,
            local_addr,
            ctx: Arc::new(ctx),
            run_flag: RunFlag::new(),
            tracker: TaskTracker::new(),
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for stopping the server
    pub fn run_flag(&self) -> RunFlag {
        self.run_flag.clone()
    }

    pub fn cache(&self) -> Arc<PageCache> {
        Arc::clone(&self.ctx.cache)
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.ctx.metrics)
    }

    /// Accept connections until stopped, then tear down.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            ctx,
            run_flag,
            tracker,
            shutdown_grace,
            ..
        } = self;

        run_dispatcher(listener, Arc::clone(&ctx), run_flag, tracker.clone()).await;

        tracker.close();
        let in_flight = tracker.len();
        if in_flight > 0 {
            info!(in_flight, grace = ?shutdown_grace, "Waiting for in-flight connections");
            if tokio::time::timeout(shutdown_grace, tracker.wait())
                .await
                .is_err()
            {
                warn!(
                    remaining = tracker.len(),
                    "Grace period elapsed, abandoning in-flight connections"
                );
            }
        }

        ctx.cache.shutdown();
        info!("Server shut down cleanly");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("ctx", &self.ctx)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}
