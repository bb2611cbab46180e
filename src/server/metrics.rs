//! Prometheus metrics endpoint
//!
//! Serves `/metrics` (text exposition) and `/healthz` on a separate address.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::dispatcher::{accept_error_action, AcceptAction, ACCEPT_ERROR_BACKOFF};
use super::shutdown::RunFlag;
use crate::cache::PageCache;
use crate::error::{Error, Result};
use crate::http::{ContentClass, Status};

/// Request and cache metrics, registered on a private registry
pub struct ServerMetrics {
    registry: Registry,
    requests: IntCounterVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    cache_evictions: IntCounter,
    cache_entries: IntGauge,
    cache_bytes: IntGauge,
}

impl ServerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("pagecache_requests_total", "Responses written, by class and status"),
            &["class", "status"],
        )
        .map_err(metrics_error)?;
        let cache_hits = IntCounter::new("pagecache_cache_hits_total", "Page cache hits")
            .map_err(metrics_error)?;
        let cache_misses = IntCounter::new("pagecache_cache_misses_total", "Page cache misses")
            .map_err(metrics_error)?;
        let cache_evictions =
            IntCounter::new("pagecache_cache_evictions_total", "Page cache evictions")
                .map_err(metrics_error)?;
        let cache_entries =
            IntGauge::new("pagecache_cache_entries", "Occupied page cache slots").map_err(metrics_error)?;
        let cache_bytes =
            IntGauge::new("pagecache_cache_bytes", "Bytes held by the page cache").map_err(metrics_error)?;

        registry.register(Box::new(requests.clone())).map_err(metrics_error)?;
        registry.register(Box::new(cache_hits.clone())).map_err(metrics_error)?;
        registry.register(Box::new(cache_misses.clone())).map_err(metrics_error)?;
        registry.register(Box::new(cache_evictions.clone())).map_err(metrics_error)?;
        registry.register(Box::new(cache_entries.clone())).map_err(metrics_error)?;
        registry.register(Box::new(cache_bytes.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            requests,
            cache_hits,
            cache_misses,
            cache_evictions,
            cache_entries,
            cache_bytes,
        })
    }

    /// Count one written response
    pub fn record_response(&self, class: ContentClass, status: Status) {
        self.requests
            .with_label_values(&[class.as_str(), status.code().to_string().as_str()])
            .inc();
    }

    pub fn requests(&self, class: ContentClass, status: Status) -> u64 {
        self.requests
            .with_label_values(&[class.as_str(), status.code().to_string().as_str()])
            .get()
    }

    /// Refresh cache gauges and encode everything in text format
    pub fn encode(&self, cache: &PageCache) -> Result<Vec<u8>> {
        let stats = cache.stats();
        advance(&self.cache_hits, stats.hits);
        advance(&self.cache_misses, stats.misses);
        advance(&self.cache_evictions, stats.evictions);
        self.cache_entries.set(stats.entries as i64);
        self.cache_bytes.set(stats.size_bytes as i64);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok(buffer)
    }
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics").finish_non_exhaustive()
    }
}

/// Bring a counter up to a monotonic source value
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

fn text_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn handle(
    req: &Request<hyper::body::Incoming>,
    metrics: &ServerMetrics,
    cache: &PageCache,
) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => match metrics.encode(cache) {
            Ok(buffer) => text_response(
                StatusCode::OK,
                "text/plain; version=0.0.4",
                Bytes::from(buffer),
            ),
            Err(e) => text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                Bytes::from(e.to_string()),
            ),
        },
        "/healthz" | "/livez" => text_response(StatusCode::OK, "text/plain", Bytes::from_static(b"ok")),
        _ => text_response(
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"not found"),
        ),
    }
}

/// Serve metrics until the run-flag is cleared
pub async fn run_metrics_server(
    addr: &str,
    metrics: Arc<ServerMetrics>,
    cache: Arc<PageCache>,
    run_flag: RunFlag,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid metrics server address: {}", e)))?;

    let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })?;

    info!("Metrics server listening on {}", addr);

    loop {
        let accepted = tokio::select! {
            _ = run_flag.stopped() => break,
            accepted = listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => match accept_error_action(&e, &run_flag) {
                AcceptAction::Stop => break,
                AcceptAction::Retry => {
                    warn!(error = %e, "Metrics server failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);
        let cache = Arc::clone(&cache);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handle(&req, &metrics, &cache);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Metrics connection error: {}", e);
            }
        });
    }

    info!("Metrics server stopped");
    Ok(())
}
