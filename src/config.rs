//! Server configuration

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::access_log::DEFAULT_ACCESS_LOG;
use crate::cache::{DEFAULT_CAPACITY, DEFAULT_IMAGE_ROOT, DEFAULT_PAGE_ROOT};
use crate::error::{Error, Result};
use crate::http::{DEFAULT_IMAGE_EXTENSIONS, DEFAULT_INDEX};

/// Default listen port
pub const DEFAULT_PORT: u16 = 8000;

/// Default listen address (all interfaces)
pub const DEFAULT_IP: &str = "0.0.0.0";

/// Validated server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub ip: String,
    /// Listen port (0 picks an ephemeral port)
    pub port: u16,
    /// Cache-eligible content root
    pub page_root: PathBuf,
    /// Cache-bypassed image root
    pub image_root: PathBuf,
    /// Page cache slots
    pub cache_capacity: usize,
    /// Pre-populate the cache from the page root at startup
    pub preload: bool,
    /// Suffixes served from the image root without caching
    pub image_extensions: Vec<String>,
    /// Key served for `/`
    pub index: String,
    /// Access log file
    pub access_log: PathBuf,
    /// Bound on the initial request read
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight connections
    pub shutdown_grace: Duration,
    /// Optional Prometheus metrics endpoint
    pub metrics_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            page_root: PathBuf::from(DEFAULT_PAGE_ROOT),
            image_root: PathBuf::from(DEFAULT_IMAGE_ROOT),
            cache_capacity: DEFAULT_CAPACITY,
            preload: true,
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            index: DEFAULT_INDEX.to_string(),
            access_log: PathBuf::from(DEFAULT_ACCESS_LOG),
            request_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            metrics_addr: None,
        }
    }
}

impl ServerConfig {
    /// Check values that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache capacity must be at least 1".into()));
        }
        if self.index.trim_matches('/').is_empty() {
            return Err(Error::Config("index key must not be empty".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        if let Some(addr) = &self.metrics_addr {
            addr.parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("invalid metrics address {:?}: {}", addr, e)))?;
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Listen socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| Error::Config(format!("'{}' is not a valid IP address", self.ip)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap(), "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.cache_capacity, 3);
        assert_eq!(config.index, "index.html");
        assert_eq!(config.image_extensions, vec!["png", "jpg", "jpeg", "gif"]);
    }

    #[test]
    fn test_invalid_ip() {
        let config = ServerConfig {
            ip: "not-an-ip".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("not-an-ip"));
    }

    #[test]
    fn test_zero_capacity() {
        let config = ServerConfig {
            cache_capacity: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_empty_index() {
        let config = ServerConfig {
            index: "/".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_bad_metrics_addr() {
        let config = ServerConfig {
            metrics_addr: Some("localhost".into()),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_ipv6() {
        let config = ServerConfig {
            ip: "::1".into(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap(), "[::1]:9000".parse::<SocketAddr>().unwrap());
    }
}
