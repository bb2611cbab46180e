//! Cooperative shutdown
//!
//! Signal delivery only flips the run-flag. Listener close and cache teardown
//! happen afterwards on the supervisory path in [`Server::run`].
//!
//! [`Server::run`]: super::Server::run

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-wide running/stopped flag
///
/// Transitions from running to stopped exactly once. Clones share state.
#[derive(Debug, Clone)]
pub struct RunFlag {
    running: Arc<AtomicBool>,
    token: CancellationToken,
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFlag {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            token: CancellationToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the flag. Returns `true` only for the call that stopped it.
    pub fn stop(&self) -> bool {
        let first = self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    /// Resolves once the flag has been cleared
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// Wait for SIGINT or SIGTERM, then clear the run-flag
pub async fn stop_on_signal(flag: RunFlag) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            warn!("Failed to listen for SIGINT: {}", e);
                        }
                    }
                    _ = term.recv() => {}
                    _ = flag.stopped() => return,
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = flag.stopped() => return,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = flag.stopped() => return,
        }
    }

    info!("Termination signal received, shutting down");
    flag.stop();
}
