//! Per-call triage pipeline.
//!
//! A [`TriageStrategy`] drains one call's media queue and publishes reports
//! through a [`ReportSink`]. Two strategies ship:
//!
//! - [`WindowedStrategy`]: accumulate a fixed window, then one request
//! - [`StreamingStrategy`]: forward every item into a live duplex session
//!
//! The running task is owned by a [`TriageHandle`], which the lifecycle
//! controller uses to cancel it and wait for it with a bound.

pub mod buffer;
pub mod sink;
pub mod streaming;
pub mod windowed;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use triage_core::CallId;

use crate::calls::media::MediaItem;

pub use sink::ReportSink;
pub use streaming::StreamingStrategy;
pub use windowed::WindowedStrategy;

/// Why a pipeline task returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The end-of-stream marker was dequeued.
    EndOfStream,
    /// The task was cancelled.
    Cancelled,
    /// Every producer handle is gone.
    QueueClosed,
}

/// One way of turning queued media into triage reports.
///
/// `run` returns only on end-of-stream, cancellation, or a closed queue.
/// Inference failures are reported through the sink and never end the run.
#[async_trait]
pub trait TriageStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Drive the pipeline for one call.
    async fn run(
        &self,
        call_id: CallId,
        rx: mpsc::Receiver<MediaItem>,
        sink: ReportSink,
        cancel: CancellationToken,
    ) -> StopReason;
}

/// Handle to a spawned pipeline task.
pub struct TriageHandle {
    cancel: CancellationToken,
    task: JoinHandle<StopReason>,
}

impl TriageHandle {
    /// Spawn `strategy` for `call_id`.
    pub fn spawn(
        strategy: Arc<dyn TriageStrategy>,
        call_id: CallId,
        rx: mpsc::Receiver<MediaItem>,
        sink: ReportSink,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            info!(call_id = %call_id, strategy = strategy.name(), "triage pipeline started");
            let reason = strategy.run(call_id.clone(), rx, sink, token).await;
            info!(call_id = %call_id, ?reason, "triage pipeline stopped");
            reason
        });
        Self { cancel, task }
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has already returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait up to `timeout` for it to return.
    ///
    /// A task that does not finish in time is aborted and `None` is returned.
    pub async fn stop(self, timeout: Duration) -> Option<StopReason> {
        self.cancel.cancel();
        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(reason)) => Some(reason),
            Ok(Err(e)) => {
                warn!(error = %e, "triage task failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "triage task did not stop in time, abandoning"
                );
                task.abort();
                None
            }
        }
    }
}

impl std::fmt::Debug for TriageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Wait for the next queue item unless `cancel` fires first.
pub(crate) async fn next_item(
    rx: &mut mpsc::Receiver<MediaItem>,
    cancel: &CancellationToken,
) -> Result<MediaItem, StopReason> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StopReason::Cancelled),
        item = rx.recv() => match item {
            Some(MediaItem::EndOfStream) => Err(StopReason::EndOfStream),
            Some(item) => Ok(item),
            None => Err(StopReason::QueueClosed),
        },
    }
}
