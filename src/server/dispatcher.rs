//! Dispatcher - accept loop
//!
//! Accepts connections while the run-flag is set and hands each one to a
//! detached worker task. Workers are tracked so shutdown can wait for them.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::shutdown::RunFlag;
use super::worker::{self, WorkerContext};

/// Pause after an unexpected accept error, so a persistent failure
/// (e.g. descriptor exhaustion) does not spin.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// What an accept loop does after a failed `accept()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptAction {
    /// Leave the loop
    Stop,
    /// Back off and accept again
    Retry,
}

/// Classify an accept error: stop when shutting down or the listener is gone
pub fn accept_error_action(err: &io::Error, run_flag: &RunFlag) -> AcceptAction {
    if !run_flag.is_running() || is_listener_closed(err) {
        AcceptAction::Stop
    } else {
        AcceptAction::Retry
    }
}

/// Whether an accept error means the listening socket is gone
pub fn is_listener_closed(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(libc::EBADF) | Some(libc::EINVAL))
    }
    #[cfg(not(unix))]
    {
        err.kind() == io::ErrorKind::InvalidInput
    }
}

/// Run the accept loop until the run-flag is cleared.
///
/// The listener is dropped on return, which closes the socket.
pub async fn run_dispatcher(
    listener: TcpListener,
    ctx: Arc<WorkerContext>,
    run_flag: RunFlag,
    tracker: TaskTracker,
) {
    info!("Dispatcher started, waiting for connections");

    while run_flag.is_running() {
        let accepted = tokio::select! {
            _ = run_flag.stopped() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, in_flight = tracker.len(), "Connection accepted, spawning worker");
                let ctx = Arc::clone(&ctx);
                tracker.spawn(async move {
                    worker::handle_connection(stream, peer, ctx).await;
                });
            }
            Err(e) => match accept_error_action(&e, &run_flag) {
                AcceptAction::Stop => {
                    info!("Listening socket closed, dispatcher exiting");
                    break;
                }
                AcceptAction::Retry => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    info!("Dispatcher stopped");
}
