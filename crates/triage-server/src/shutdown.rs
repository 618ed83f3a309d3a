//! Graceful shutdown coordination via `CancellationToken`.
//!
//! On shutdown every live call is ended with reason `server_shutdown` while
//! its sockets can still carry the notification. Only then does the token
//! fire, stopping the listener and every socket read loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::calls::CallCoordinator;

/// Default timeout for graceful shutdown before giving up on tasks.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the listener, sockets, and calls.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down in order:
    ///
    /// 1. end every live call, notifying both parties
    /// 2. cancel the token (listener and socket loops stop)
    /// 3. wait up to `timeout` for `handles`, aborting any left over
    pub async fn graceful_shutdown(
        &self,
        coordinator: &Arc<CallCoordinator>,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        coordinator.shutdown().await;
        self.shutdown();

        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
        }
    }
}
