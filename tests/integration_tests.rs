//! End-to-end tests against a real listener on 127.0.0.1
//!
//! - Serving pages and images from disk
//! - LRU behaviour observed through the wire
//! - Concurrent clients
//! - Cooperative shutdown

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pagecache_httpd::access_log::NullAccessLog;
use pagecache_httpd::{InMemoryAccessLog, RunFlag, Server, ServerConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    run_flag: RunFlag,
    cache: Arc<pagecache_httpd::PageCache>,
    log: Arc<InMemoryAccessLog>,
    handle: JoinHandle<pagecache_httpd::Result<()>>,
    _pages: TempDir,
    _images: TempDir,
}

fn write_files(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        std::fs::write(dir.join(name), data).unwrap();
    }
}

async fn start(capacity: usize, preload: bool) -> TestServer {
    let pages = tempfile::tempdir().unwrap();
    let images = tempfile::tempdir().unwrap();

    write_files(
        pages.path(),
        &[
            ("index.html", b"<h1>home</h1>"),
            ("a.html", b"page a"),
            ("b.html", b"page b"),
            ("c.html", b"page c"),
            ("d.html", b"page d"),
            ("site.css", b"body{margin:0}"),
        ],
    );
    write_files(images.path(), &[("photo.jpg", &[0xFF, 0xD8, 0xFF, 0xE0])]);

    let config = ServerConfig {
        ip: "127.0.0.1".into(),
        port: 0,
        page_root: pages.path().to_path_buf(),
        image_root: images.path().to_path_buf(),
        cache_capacity: capacity,
        preload,
        request_timeout: Duration::from_secs(2),
        shutdown_grace: Duration::from_secs(2),
        ..Default::default()
    };

    let log = Arc::new(InMemoryAccessLog::new());
    let server = Server::bind(&config, log.clone()).await.unwrap();

    let addr = server.local_addr();
    let run_flag = server.run_flag();
    let cache = server.cache();
    let handle = tokio::spawn(server.run());

    TestServer {
        addr,
        run_flag,
        cache,
        log,
        handle,
        _pages: pages,
        _images: images,
    }
}

async fn fetch(addr: SocketAddr, target: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", target).as_bytes())
        .await
        .unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    let body = raw[split + 4..].to_vec();
    (head, body)
}

fn cached_keys(server: &TestServer) -> Vec<String> {
    server.cache.snapshot().into_iter().map(|s| s.key).collect()
}

async fn stop(server: TestServer) {
    server.run_flag.stop();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

// =============================================================================
// Serving
// =============================================================================

mod serving_tests {
    use super::*;

    #[tokio::test]
    async fn test_root_serves_index() {
        let server = start(3, false).await;

        let (head, body) = fetch(server.addr, "/").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: text/html"));
        assert!(head.contains("Content-Length: 13"));
        assert!(head.contains("Connection: close"));
        assert_eq!(body, b"<h1>home</h1>");

        stop(server).await;
    }

    #[tokio::test]
    async fn test_css_content_type() {
        let server = start(3, false).await;

        let (head, body) = fetch(server.addr, "/site.css").await;
        assert!(head.contains("Content-Type: text/css"));
        assert_eq!(body, b"body{margin:0}");

        stop(server).await;
    }

    #[tokio::test]
    async fn test_missing_file_404() {
        let server = start(3, false).await;

        let (head, body) = fetch(server.addr, "/missing.html").await;
        assert!(head.starts_with("HTTP/1.1 404 Not Found"));
        assert_eq!(body, pagecache_httpd::http::NOT_FOUND_BODY.as_bytes());
        assert!(server.cache.is_empty());

        stop(server).await;
    }

    #[tokio::test]
    async fn test_image_served_but_never_cached() {
        let server = start(3, false).await;

        let (head, body) = fetch(server.addr, "/photo.jpg").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: image/jpeg"));
        assert_eq!(body, vec![0xFF, 0xD8, 0xFF, 0xE0]);

        assert!(!cached_keys(&server).contains(&"photo.jpg".to_string()));
        assert!(server.log.is_empty());

        stop(server).await;
    }

    #[tokio::test]
    async fn test_directory_traversal_stays_in_root() {
        let server = start(3, false).await;

        let (head, body) = fetch(server.addr, "/../../etc/a.html").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"page a");

        stop(server).await;
    }

    #[tokio::test]
    async fn test_pages_are_logged() {
        let server = start(3, false).await;

        fetch(server.addr, "/a.html").await;
        fetch(server.addr, "/missing.html").await;
        fetch(server.addr, "/photo.jpg").await;

        // The log write happens right after the socket is closed
        tokio::time::sleep(Duration::from_millis(100)).await;
        let records = server.log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "a.html");
        assert!(records[0].peer.ip().is_loopback());

        stop(server).await;
    }
}

// =============================================================================
// Page cache behaviour over the wire
// =============================================================================

mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_lru_eviction_through_server() {
        let server = start(3, false).await;

        for target in ["/a.html", "/b.html", "/c.html", "/a.html", "/d.html"] {
            let (head, _) = fetch(server.addr, target).await;
            assert!(head.starts_with("HTTP/1.1 200 OK"));
        }

        let mut keys = cached_keys(&server);
        keys.sort();
        assert_eq!(keys, vec!["a.html", "c.html", "d.html"]);

        stop(server).await;
    }

    #[tokio::test]
    async fn test_same_entry_with_and_without_slash() {
        let server = start(3, false).await;

        fetch(server.addr, "/a.html").await;
        fetch(server.addr, "a.html").await;

        assert_eq!(cached_keys(&server), vec!["a.html"]);
        let stats = server.cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);

        stop(server).await;
    }

    #[tokio::test]
    async fn test_preload_fills_cache() {
        let server = start(2, true).await;

        // Sorted names: a.html, b.html, ...
        assert_eq!(cached_keys(&server), vec!["a.html", "b.html"]);

        fetch(server.addr, "/b.html").await;
        assert_eq!(server.cache.stats().hits, 1);

        stop(server).await;
    }

    #[tokio::test]
    async fn test_cache_serves_after_file_deleted() {
        let server = start(3, false).await;

        fetch(server.addr, "/c.html").await;
        std::fs::remove_file(server._pages.path().join("c.html")).unwrap();

        let (head, body) = fetch(server.addr, "/c.html").await;
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"page c");

        stop(server).await;
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency_tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_clients() {
        let server = start(3, false).await;
        let addr = server.addr;

        let targets = ["/a.html", "/b.html", "/site.css", "/photo.jpg", "/missing.html"];
        let mut tasks = Vec::new();
        for i in 0..50 {
            let target = targets[i % targets.len()];
            tasks.push(tokio::spawn(async move { (target, fetch(addr, target).await) }));
        }

        for task in tasks {
            let (target, (head, _)) = task.await.unwrap();
            if target == "/missing.html" {
                assert!(head.starts_with("HTTP/1.1 404"), "{} -> {}", target, head);
            } else {
                assert!(head.starts_with("HTTP/1.1 200"), "{} -> {}", target, head);
            }
        }

        let keys = cached_keys(&server);
        let unique: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(unique.len(), keys.len());
        assert!(keys.len() <= 3);
        let allowed: HashSet<String> = ["a.html", "b.html", "site.css"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(unique.is_subset(&allowed));

        stop(server).await;
    }
}

// =============================================================================
// Shutdown
// =============================================================================

mod shutdown_tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_releases_cache_and_closes_listener() {
        let server = start(3, false).await;
        fetch(server.addr, "/a.html").await;
        assert_eq!(server.cache.len(), 1);

        let addr = server.addr;
        let cache = Arc::clone(&server.cache);
        stop(server).await;

        assert!(cache.snapshot().is_empty());
        assert!(cache.is_closed());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_in_flight_request_finishes_during_shutdown() {
        let server = start(3, false).await;

        // Connect but send the request only after shutdown has begun
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.run_flag.stop();

        stream
            .write_all(b"GET /a.html HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        assert!(raw.starts_with(b"HTTP/1.1 200 OK"));

        tokio::time::timeout(Duration::from_secs(5), server.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let server = start(3, false).await;

        let config = ServerConfig {
            ip: "127.0.0.1".into(),
            port: server.addr.port(),
            ..Default::default()
        };
        let result = Server::bind(&config, Arc::new(NullAccessLog)).await;
        assert!(matches!(result, Err(pagecache_httpd::Error::Bind { .. })));

        stop(server).await;
    }
}
