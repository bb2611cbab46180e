//! pagecache-httpd
//!
//! Serves files from a page root (cached) and an image root (uncached).
//!
//! ```text
//! pagecache-httpd [port] [ip]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pagecache_httpd::access_log::FileAccessLog;
use pagecache_httpd::cache::{DEFAULT_IMAGE_ROOT, DEFAULT_PAGE_ROOT};
use pagecache_httpd::config::{ServerConfig, DEFAULT_IP, DEFAULT_PORT};
use pagecache_httpd::error::Result;
use pagecache_httpd::server::{run_metrics_server, stop_on_signal, Server};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Minimal concurrent HTTP file server with an LRU page cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Address to listen on
    #[arg(default_value = DEFAULT_IP)]
    ip: String,

    /// Directory of cache-eligible pages
    #[arg(long, env = "PAGE_ROOT", default_value = DEFAULT_PAGE_ROOT)]
    page_root: PathBuf,

    /// Directory of images (served without caching)
    #[arg(long, env = "IMAGE_ROOT", default_value = DEFAULT_IMAGE_ROOT)]
    image_root: PathBuf,

    /// Number of page cache slots
    #[arg(long, env = "CACHE_CAPACITY", default_value = "3")]
    cache_capacity: usize,

    /// Skip pre-populating the cache from the page root
    #[arg(long, env = "NO_PRELOAD")]
    no_preload: bool,

    /// Suffix served from the image root without caching (repeatable)
    #[arg(long = "image-ext", value_delimiter = ',', default_value = "png,jpg,jpeg,gif")]
    image_extensions: Vec<String>,

    /// Key served for "/"
    #[arg(long, default_value = "index.html")]
    index: String,

    /// Access log file
    #[arg(long, env = "ACCESS_LOG", default_value = "log_conexiones.txt")]
    access_log: PathBuf,

    /// Seconds to wait for a request line before closing the connection
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    request_timeout_secs: u64,

    /// Seconds shutdown waits for in-flight connections
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "5")]
    shutdown_grace_secs: u64,

    /// Prometheus metrics bind address (disabled when unset)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            ip: self.ip.clone(),
            port: self.port,
            page_root: self.page_root.clone(),
            image_root: self.image_root.clone(),
            cache_capacity: self.cache_capacity,
            preload: !self.no_preload,
            image_extensions: self.image_extensions.clone(),
            index: self.index.clone(),
            access_log: self.access_log.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            metrics_addr: self.metrics_addr.clone(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = args.server_config();
    info!("Starting pagecache-httpd v{}", pagecache_httpd::VERSION);
    info!("  Listen: {}:{}", config.ip, config.port);
    info!("  Page root: {}", config.page_root.display());
    info!("  Image root: {}", config.image_root.display());
    info!("  Cache capacity: {}", config.cache_capacity);
    info!("  Access log: {}", config.access_log.display());

    let access_log = Arc::new(FileAccessLog::new(config.access_log.clone()));
    let server = Server::bind(&config, access_log).await.map_err(|e| {
        error!("Failed to start server: {}", e);
        e
    })?;

    let run_flag = server.run_flag();
    tokio::spawn(stop_on_signal(run_flag.clone()));

    if let Some(addr) = config.metrics_addr.clone() {
        let metrics = server.metrics();
        let cache = server.cache();
        let flag = run_flag.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(&addr, metrics, cache, flag).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tokio=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
